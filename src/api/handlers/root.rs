// axum handler for /
pub async fn root() -> &'static str {
    "waguri says hello!"
}

// axum handler for /hello
pub async fn hello() -> &'static str {
    "live"
}
