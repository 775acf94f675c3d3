//! URL joining rules.

use resilient_httpclient::build_url;
use test_case::test_case;

#[test_case("http://host/", "/path", &[] => "http://host/path" ; "slashes on both sides")]
#[test_case("http://host", "path", &[] => "http://host/path" ; "no slashes")]
#[test_case("http://host///", "path", &[] => "http://host/path" ; "repeated trailing slashes")]
#[test_case("http://host", "", &[] => "http://host" ; "empty path")]
#[test_case("http://host", "/", &[] => "http://host" ; "root path")]
#[test_case("http://host", "/users", &["7"] => "http://host/users/7" ; "one variable")]
#[test_case("http://host", "users/", &["7", "orders"] => "http://host/users/7/orders" ; "path with trailing slash")]
#[test_case("http://host:8080/api/", "/v1/items", &["a"] => "http://host:8080/api/v1/items/a" ; "host with base path")]
fn test_build_url(host: &str, path: &str, variables: &[&str]) -> String {
    let variables: Vec<String> = variables.iter().map(|v| v.to_string()).collect();
    build_url(host, path, &variables)
}

#[test]
fn test_equivalent_forms_agree() {
    assert_eq!(
        build_url("http://host/", "/path", &[]),
        build_url("http://host", "path", &[])
    );
}
