#[tokio::main]
async fn main() {
    qrtrail::start_server().await;
}
