pub fn rate_limit_key(scope: &str, client: &str) -> String {
    format!("ratelimit:{}:{}", scope, client)
}
