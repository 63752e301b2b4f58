#[tokio::main]
async fn main() -> std::io::Result<()> {
    snake_arena::frameworks::server::run_with_config().await
}
