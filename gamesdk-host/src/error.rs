//! Native result codes and session-level errors.

use std::fmt;

use crate::native::Feature;
use crate::params::CreateParams;

/// Result codes returned by every fallible native call.
///
/// `Ok` (0) is the only success value. Every other value is a failure
/// category surfaced to the caller through [`SessionError::Failed`].
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok = 0,
    ServiceUnavailable = 1,
    InvalidVersion = 2,
    LockFailed = 3,
    InternalError = 4,
    InvalidPayload = 5,
    InvalidCommand = 6,
    InvalidPermissions = 7,
    NotFetched = 8,
    NotFound = 9,
    Conflict = 10,
    InvalidSecret = 11,
    InvalidJoinSecret = 12,
    NoEligibleActivity = 13,
    InvalidInvite = 14,
    NotAuthenticated = 15,
    InvalidAccessToken = 16,
    ApplicationMismatch = 17,
    InvalidDataUrl = 18,
    InvalidBase64 = 19,
    NotFiltered = 20,
    LobbyFull = 21,
    InvalidLobbySecret = 22,
    InvalidFilename = 23,
    InvalidFileSize = 24,
    InvalidEntitlement = 25,
    NotInstalled = 26,
    NotRunning = 27,
    InsufficientBuffer = 28,
    PurchaseCanceled = 29,
    InvalidGuild = 30,
    InvalidEvent = 31,
    InvalidChannel = 32,
    InvalidOrigin = 33,
    RateLimited = 34,
    OAuth2Error = 35,
    SelectTimeout = 36,
    GetGuildTimeout = 37,
    SelectVoiceForceRequired = 38,
    CaptureShortcutAlreadyListening = 39,
    UnauthorizedForAchievement = 40,
    InvalidGiftCode = 41,
    PurchaseError = 42,
    TransactionAborted = 43,
    DrawingInitFailed = 44,
}

impl ResultCode {
    const ALL: [ResultCode; 45] = [
        ResultCode::Ok,
        ResultCode::ServiceUnavailable,
        ResultCode::InvalidVersion,
        ResultCode::LockFailed,
        ResultCode::InternalError,
        ResultCode::InvalidPayload,
        ResultCode::InvalidCommand,
        ResultCode::InvalidPermissions,
        ResultCode::NotFetched,
        ResultCode::NotFound,
        ResultCode::Conflict,
        ResultCode::InvalidSecret,
        ResultCode::InvalidJoinSecret,
        ResultCode::NoEligibleActivity,
        ResultCode::InvalidInvite,
        ResultCode::NotAuthenticated,
        ResultCode::InvalidAccessToken,
        ResultCode::ApplicationMismatch,
        ResultCode::InvalidDataUrl,
        ResultCode::InvalidBase64,
        ResultCode::NotFiltered,
        ResultCode::LobbyFull,
        ResultCode::InvalidLobbySecret,
        ResultCode::InvalidFilename,
        ResultCode::InvalidFileSize,
        ResultCode::InvalidEntitlement,
        ResultCode::NotInstalled,
        ResultCode::NotRunning,
        ResultCode::InsufficientBuffer,
        ResultCode::PurchaseCanceled,
        ResultCode::InvalidGuild,
        ResultCode::InvalidEvent,
        ResultCode::InvalidChannel,
        ResultCode::InvalidOrigin,
        ResultCode::RateLimited,
        ResultCode::OAuth2Error,
        ResultCode::SelectTimeout,
        ResultCode::GetGuildTimeout,
        ResultCode::SelectVoiceForceRequired,
        ResultCode::CaptureShortcutAlreadyListening,
        ResultCode::UnauthorizedForAchievement,
        ResultCode::InvalidGiftCode,
        ResultCode::PurchaseError,
        ResultCode::TransactionAborted,
        ResultCode::DrawingInitFailed,
    ];

    /// Convert a raw value coming back across the C ABI.
    ///
    /// Values outside the known range collapse to `InternalError`.
    pub fn from_raw(raw: i32) -> Self {
        usize::try_from(raw)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .unwrap_or_else(|| {
                tracing::warn!(raw, "unknown native result code");
                ResultCode::InternalError
            })
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} ({})", self.as_raw())
    }
}

/// Errors raised by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Dispatch attempted after `close()`. Detected before any native call.
    #[error("Core is closed")]
    Closed,

    /// A native operation returned a non-`Ok` result code.
    #[error("Game SDK operation failed: {0}")]
    Failed(ResultCode),

    /// The native layer returned no sub-handle for a feature during creation.
    #[error("native layer returned no {0:?} manager")]
    MissingFeature(Feature),

    /// Creation parameters were allocated by a different native runtime.
    #[error("creation parameters belong to a different native runtime")]
    ForeignParams,

    /// The native layer could not allocate a creation-parameter block.
    #[error("native layer failed to allocate creation parameters")]
    ParamsAllocation,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SessionError {
    /// The failing result code, if this error carries one.
    pub fn result(&self) -> Option<ResultCode> {
        match self {
            SessionError::Failed(code) => Some(*code),
            _ => None,
        }
    }
}

/// Default result policy: any non-`Ok` code becomes an error.
pub fn raise_on_failure(code: ResultCode) -> Result<(), SessionError> {
    if code.is_ok() {
        Ok(())
    } else {
        Err(SessionError::Failed(code))
    }
}

/// Callback applied to completion codes when the caller supplies none.
pub const DEFAULT_CALLBACK: fn(ResultCode) -> Result<(), SessionError> = raise_on_failure;

/// Session construction failed.
///
/// Ownership of the creation parameters never transferred; they are handed
/// back so the caller can retry or drop (and thereby release) them.
pub struct CreateError {
    error: SessionError,
    params: CreateParams,
}

impl CreateError {
    pub(crate) fn new(error: SessionError, params: CreateParams) -> Self {
        Self { error, params }
    }

    pub fn error(&self) -> &SessionError {
        &self.error
    }

    /// Shortcut for the native result code when creation itself failed.
    pub fn result(&self) -> Option<ResultCode> {
        self.error.result()
    }

    pub fn params(&self) -> &CreateParams {
        &self.params
    }

    pub fn into_params(self) -> CreateParams {
        self.params
    }

    pub fn into_parts(self) -> (SessionError, CreateParams) {
        (self.error, self.params)
    }
}

impl fmt::Debug for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to create session: {}", self.error)
    }
}

impl std::error::Error for CreateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
