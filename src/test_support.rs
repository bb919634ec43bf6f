/// Whether httpmock-backed tests should be skipped because the environment
/// forbids binding a localhost listener.
pub fn should_skip_httpmock() -> bool {
    match std::net::TcpListener::bind(("127.0.0.1", 0)) {
        Ok(_) => false,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("skipping httpmock test: binding to localhost is not permitted here");
            true
        }
        Err(err) => panic!("failed to bind localhost for httpmock tests: {err}"),
    }
}
