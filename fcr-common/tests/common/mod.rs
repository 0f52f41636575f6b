use fcr_common::{Credentials, RestClient, UreqTransport};
use std::time::Duration;

pub fn client_for(base_url: &str) -> RestClient {
    RestClient::new(
        UreqTransport::new(base_url, Duration::from_secs(5)),
        Credentials::new("test_user", "x-pack-test-password"),
    )
}

pub const AUTH: &str = "Basic dGVzdF91c2VyOngtcGFjay10ZXN0LXBhc3N3b3Jk";
