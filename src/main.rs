#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    guest_pass_backend::run().await
}
