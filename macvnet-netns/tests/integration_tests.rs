use macvnet_core::Error;
use macvnet_netns::*;

fn thread_netns_id() -> String {
    std::fs::read_link("/proc/thread-self/ns/net")
        .unwrap()
        .to_string_lossy()
        .into_owned()
}

#[test]
fn test_handle_trait_path() {
    fn path_of(handle: &impl NamespaceHandle) -> String {
        handle.path().display().to_string()
    }

    let ns = NetNs::open("/proc/self/ns/net").unwrap();
    assert_eq!(path_of(&ns), "/proc/self/ns/net");
}

#[tokio::test]
#[ignore] // Requires CAP_SYS_ADMIN
async fn test_run_in_current_namespace() {
    let host = thread_netns_id();
    let ns = NetNs::current().unwrap();

    let inside = ns
        .run(|| async { Ok(thread_netns_id()) })
        .await
        .unwrap();

    assert_eq!(inside, host);
    // The caller's thread is untouched
    assert_eq!(thread_netns_id(), host);
}

#[tokio::test]
#[ignore] // Requires CAP_SYS_ADMIN
async fn test_run_propagates_operation_error() {
    let ns = NetNs::current().unwrap();

    let err = ns
        .run(|| async {
            Err::<(), _>(Error::Namespace {
                message: "boom".to_string(),
            })
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("boom"));
}
