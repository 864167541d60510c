mod config;
mod remarkable;
mod sync;
mod zotero;

#[cfg(test)]
mod testing;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

use crate::config::{Args, ConfigError, FileTokenStore};
use crate::remarkable::{CloudEndpoints, ReqwestTransport, TokenLifecycle, UploadProtocol};
use crate::sync::{CollectionTree, SyncError, SyncReport, SyncTraversal, establish_session};
use crate::zotero::{SourceLibrary, ZoteroClient};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let args = Args::parse();

	match run(args).await {
		Ok(report) => {
			report.log();
			if report.is_success() {
				ExitCode::SUCCESS
			} else {
				ExitCode::FAILURE
			}
		}
		Err(e) => {
			error!("Sync aborted: {}", e);
			ExitCode::FAILURE
		}
	}
}

async fn run(args: Args) -> Result<SyncReport, SyncError> {
	info!("Starting Zotero to reMarkable sync for {}", args.library_name);

	let store = FileTokenStore::at(args.config_path.clone())?;
	info!("Using token file {}", store.path().display());
	let transport = Arc::new(ReqwestTransport::new()?);
	let lifecycle = TokenLifecycle::new(transport.clone(), CloudEndpoints::default());

	let token = establish_session(&lifecycle, &store, args.device_descriptor, prompt_one_time_code).await?;
	info!("Created reMarkable session on {}", token.storage_host());

	let library = Arc::new(ZoteroClient::new(
		args.library_id.clone(),
		args.library_type,
		args.api_key.clone(),
	)?);
	let collections = library.list_collections().await?;
	info!("Retrieved {} collections", collections.len());

	let tree = CollectionTree::build(&args.library_name, &collections)?;

	let traversal = SyncTraversal::new(
		library,
		UploadProtocol::new(transport),
		token,
		args.sync_config(),
	);
	Ok(traversal.run(&tree).await)
}

/// Ask for a one-time code on the terminal.
async fn prompt_one_time_code() -> Result<String, ConfigError> {
	let io_error = |source: std::io::Error| ConfigError::Io {
		path: "stdin".into(),
		source,
	};

	let mut stdout = tokio::io::stdout();
	stdout
		.write_all(b"Enter a one-time code from https://my.remarkable.com/device/desktop/connect: ")
		.await
		.map_err(io_error)?;
	stdout.flush().await.map_err(io_error)?;

	let mut line = String::new();
	BufReader::new(tokio::io::stdin())
		.read_line(&mut line)
		.await
		.map_err(io_error)?;

	Ok(line.trim().to_string())
}
