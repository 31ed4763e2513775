// src/bin/tt_cli.rs
use tensor_train_layer::cli;

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = cli::run_cli() {
        eprintln!("Application error: {}", e);
        let mut current_err: Option<&(dyn std::error::Error + 'static)> = e.source();
        while let Some(source) = current_err {
            eprintln!("Caused by: {}", source);
            current_err = source.source();
        }
        std::process::exit(1);
    }
}
