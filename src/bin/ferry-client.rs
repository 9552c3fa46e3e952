//! ferry-client: run one download, upload or list against a ferry server

use ferry::protocol::display_name;
use ferry::{logging, Client, ClientConfig, Command, DownloadOutcome, FileStore, UploadOutcome};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = ClientConfig::load()?;

    // Initialize logging
    logging::init(&config.log_level, &config.log_file)?;

    // Nothing to do without an operation flag
    let Some(request) = config.operation.clone() else {
        return Ok(());
    };

    let client = Client::new(config.server.clone(), FileStore::new(&config.root));
    let file_name = request.file_name.as_slice();
    let name = display_name(file_name);

    info!(command = %request.command, file = ?name, server = %config.server, "Operation started");

    let result = match request.command {
        Command::Download => client.download(file_name).await.map(|outcome| match outcome {
            DownloadOutcome::Downloaded { .. } => {
                println!("File \"{}\" downloaded successfully", name)
            }
            DownloadOutcome::NotFoundOnServer => {
                println!("File \"{}\" does not exist on the server", name)
            }
        }),
        Command::Upload => client.upload(file_name).await.map(|outcome| match outcome {
            UploadOutcome::Uploaded { .. } => {
                println!("File \"{}\" uploaded to the server successfully", name)
            }
            UploadOutcome::SourceMissing => println!("File \"{}\" does not exist", name),
        }),
        Command::List => client.list().await.map(|names| {
            println!("Files available for download:");
            for name in names {
                println!("{}", display_name(&name));
            }
        }),
    };

    if let Err(e) = result {
        error!(command = %request.command, error = %e, "Operation failed");
        return Err(e.into());
    }

    info!(command = %request.command, "Operation ended");
    Ok(())
}
