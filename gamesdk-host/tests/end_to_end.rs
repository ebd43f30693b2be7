mod common;

use std::sync::Arc;

use common::RecordingSdk;
use gamesdk_host::platform::{ArtifactDescriptor, BINDING_LIBRARY};
use gamesdk_host::stage::MemoryResources;
use gamesdk_host::{
    Activity, ArchConvention, ArtifactSource, Core, CreateFlags, CreateParams, LoadPlan,
    NativeRuntime, Os, Platform, Stager, TempRegistry,
};

#[test]
fn test_resolve_and_stage_binding_object() {
    let platform = Platform::resolve("linux", "amd64").unwrap();
    let artifact = platform.binding_artifact(BINDING_LIBRARY, ArchConvention::Normalized);
    assert_eq!(
        artifact,
        ArtifactDescriptor {
            os: Os::Linux,
            arch: "amd64".to_string(),
            object_name: "libdiscord_game_sdk_jni.so".to_string(),
        }
    );

    let payload: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
    let resources = MemoryResources::new().with(&artifact.bundled_path(), payload.clone());
    let scratch = tempfile::tempdir().unwrap();
    let stager = Stager::new(Arc::new(resources))
        .with_registry(Arc::new(TempRegistry::new()))
        .with_temp_root(scratch.path());

    let first = stager
        .stage(ArtifactSource::Bundled(&artifact.bundled_path()))
        .unwrap();
    assert_eq!(first.file_name().unwrap(), "libdiscord_game_sdk_jni.so");
    assert_eq!(std::fs::read(&first).unwrap(), payload);

    let second = stager
        .stage(ArtifactSource::Bundled(&artifact.bundled_path()))
        .unwrap();
    assert_ne!(first.parent(), second.parent());
    assert_eq!(std::fs::read(&second).unwrap(), payload);
}

#[test]
fn test_full_session_against_stand_in() {
    let platform = Platform::resolve("Linux", "x86_64").unwrap();
    let sdk_file = common::sdk_path();
    let plan = LoadPlan::new(platform.os(), &sdk_file, "/tmp/libdiscord_game_sdk_jni.so".as_ref())
        .unwrap();
    assert_eq!(plan.preload, None);

    let sdk = RecordingSdk::new();
    let runtime = NativeRuntime::bootstrap(sdk.clone(), &plan.bootstrap_path).unwrap();
    assert_eq!(sdk.bootstrap_path(), Some(plan.bootstrap_path.clone()));

    let mut params = CreateParams::new(&runtime).unwrap();
    params.set_client_id(1121410048996954192);
    params.set_flags(CreateFlags::NO_REQUIRE_DISCORD);
    let core = Core::new(&runtime, params).unwrap();
    assert_eq!(core.generation(), runtime.generation());

    let mut activity = Activity::new("details field", "state field").started_now();
    activity.party.size.current_size = 2;
    activity.party.size.max_size = 16;
    activity.assets.large_image = "test".to_string();
    activity.assets.large_text = "this is a big image".to_string();
    core.activity_manager().update_activity(&activity).unwrap();

    for _ in 0..3 {
        core.run_callbacks().unwrap();
    }
    core.close();

    assert_eq!(RecordingSdk::count(&sdk.calls.update_activity), 1);
    assert_eq!(RecordingSdk::count(&sdk.calls.run_callbacks), 3);
    assert_eq!(RecordingSdk::count(&sdk.calls.destroy), 1);
    assert_eq!(RecordingSdk::count(&sdk.calls.alloc), 1);
    assert_eq!(RecordingSdk::count(&sdk.calls.free), 1);
}

#[test]
fn test_windows_plan_orders_preload_first() {
    let platform = Platform::resolve("Windows 10", "amd64").unwrap();
    let sdk_file = std::env::temp_dir().join("discord_game_sdk.dll");
    let plan = LoadPlan::new(
        platform.os(),
        &sdk_file,
        "C:/staged/discord_game_sdk_jni.dll".as_ref(),
    )
    .unwrap();
    assert_eq!(plan.preload.as_deref(), Some(sdk_file.as_path()));
    assert_eq!(plan.bootstrap_path, sdk_file);
}
