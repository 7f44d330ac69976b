#[tokio::main]
async fn main() {
    if let Err(e) = polaris_lib::run().await {
        eprintln!("polaris: {}", e);
        std::process::exit(1);
    }
}
