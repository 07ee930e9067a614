fn main() {
    if let Err(err) = ask_bridge::cli::run_ask_bridge() {
        tracing::error!(error = %err, "ask-bridge failed");
        std::process::exit(1);
    }
}
