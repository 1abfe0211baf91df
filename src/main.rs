use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match selfheal::cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::from(selfheal::errors::get_exit_code(&e))
        }
    }
}
