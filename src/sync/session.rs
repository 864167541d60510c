use super::types::SyncError;
use crate::config::{ConfigError, TokenStore};
use crate::remarkable::{DeviceDescriptor, TokenLifecycle, TokenState};

use std::future::Future;
use tracing::info;
use uuid::Uuid;

/// Obtain a working destination session.
///
/// A stored token is refreshed; without one the device is registered with a
/// one-time code obtained from `prompt`. The new token is written to `store`
/// before anything else uses it, since a refresh invalidates the old one.
///
/// # Arguments
/// * `lifecycle` - Token and storage host operations
/// * `store` - Where the bearer token lives between runs
/// * `device` - Device class announced on registration
/// * `prompt` - Asked for a one-time code only when registration is needed
pub async fn establish_session<F, Fut>(
	lifecycle: &TokenLifecycle,
	store: &dyn TokenStore,
	device: DeviceDescriptor,
	prompt: F,
) -> Result<TokenState, SyncError>
where
	F: FnOnce() -> Fut,
	Fut: Future<Output = Result<String, ConfigError>>,
{
	let token = match store.read_token().await? {
		Some(old_token) => {
			info!("Refreshing stored reMarkable token");
			lifecycle.refresh_token(&old_token).await?
		}
		None => {
			info!("No stored reMarkable token, registering this device");
			let code = prompt().await?;
			let code = code.trim();
			if code.is_empty() {
				return Err(ConfigError::MissingOneTimeCode.into());
			}
			lifecycle
				.register_device(code, device, &Uuid::new_v4().to_string())
				.await?
		}
	};

	store.write_token(&token).await?;

	let host = lifecycle.resolve_storage_host(&token).await?;
	info!("Using storage host {}", host);
	Ok(TokenState::new(token, host))
}
