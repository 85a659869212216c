// src/main.rs
#[tokio::main]
async fn main() {
    env_logger::init();

    let result = sublingo::cli::run().await;
    match result {
        Ok(_) => std::process::exit(0),
        Err(e) => {
            if !e.is_canceled() {
                sublingo::cli::print_error(&e.user_friendly_message());
            }
            std::process::exit(e.exit_code());
        }
    }
}
