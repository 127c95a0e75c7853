use async_trait::async_trait;
use std::{error::Error, fmt, time::Duration};
use url::Url;

mod dyn_error;

pub use dyn_error::DynError;

/// Content type of every ingest request body.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Upper bound for a single request unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestOptions {
	/// Full ingest URL, including the `token` query pair.
	pub endpoint: Url,
	pub timeout: Duration,
}

impl IngestOptions {
	pub fn new(endpoint: Url) -> Self {
		IngestOptions {
			endpoint,
			timeout: DEFAULT_TIMEOUT,
		}
	}

	pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
		self.timeout = timeout;
		self
	}
}

pub trait AsIngestOptions {
	type Error: Error + Send + Sync + 'static;

	fn ingest_options(&self) -> Result<IngestOptions, Self::Error>;
}

impl<T, E> AsIngestOptions for T
where
	T: TryInto<IngestOptions, Error = E> + Clone,
	E: Error + Send + Sync + 'static,
{
	type Error = E;

	fn ingest_options(&self) -> Result<IngestOptions, E> {
		self.clone().try_into()
	}
}

pub trait IngestProviderCreateError {
	fn options(source: impl Error + Send + Sync + 'static) -> Self;
}

/// Opens [`IngestClient`]s. One client is created per loaded config entry.
#[async_trait]
pub trait IngestProvider: Send + Sync + 'static {
	type Client: IngestClient;
	type Error: IngestProviderCreateError + Error + Send + Sync + 'static;

	const NAME: &'static str;

	async fn create<O>(&self, options: &O) -> Result<Self::Client, Self::Error>
	where
		O: AsIngestOptions + Sync;
}

/// An open HTTP session against one ingest endpoint.
///
/// Clients are shared between concurrent push attempts, so every method takes
/// `&self`. Once [`IngestClient::close`] has been called, [`IngestClient::post`]
/// fails.
#[async_trait]
pub trait IngestClient: Send + Sync + 'static {
	type PostError: Error + Send + Sync + 'static;
	type CloseError: Error + Send + Sync + 'static;

	fn endpoint(&self) -> &Url;

	async fn post(&self, payload: Vec<u8>) -> Result<IngestResponse, Self::PostError>;

	async fn close(&self) -> Result<(), Self::CloseError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestResponse {
	pub status: u16,
	pub body: String,
}

impl IngestResponse {
	pub fn new(status: u16, body: impl Into<String>) -> Self {
		IngestResponse {
			status,
			body: body.into(),
		}
	}

	/// Reitti answers `200 OK` or `202 Accepted` for stored locations.
	#[inline]
	pub fn is_accepted(&self) -> bool {
		matches!(self.status, 200 | 202)
	}
}

impl fmt::Display for IngestResponse {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "status={}, body={}", self.status, self.body)
	}
}
