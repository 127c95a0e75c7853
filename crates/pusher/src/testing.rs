use crate::{ConfigEntry, PushConfig};
use async_trait::async_trait;
use hass_entity_state::{EntityId, EntityState};
use reitti_ingest_provider::{
	AsIngestOptions, DynError, IngestClient, IngestProvider, IngestProviderCreateError,
	IngestResponse,
};
use serde_json::{Map, Value, json};
use std::{
	io,
	sync::{
		Arc, Mutex, PoisonError,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration,
};
use thiserror::Error;
use tracing::{Level, subscriber::DefaultGuard};
use tracing_subscriber::fmt::MakeWriter;
use url::Url;

pub(crate) const ENDPOINT: &str = "http://reitti:8080/api/v1/ingest/owntracks?token=abc";

pub(crate) fn object(value: Value) -> Map<String, Value> {
	let Value::Object(map) = value else {
		unreachable!()
	};
	map
}

pub(crate) fn entry(entry_id: &str, options: Value) -> ConfigEntry {
	ConfigEntry::new(
		entry_id,
		"Reitti Integration",
		object(json!({
			"url": "http://reitti",
			"port": 8080,
			"api_key": "abc",
			"device": "device_tracker.johns_phone",
		})),
		object(options),
	)
}

pub(crate) fn config(options: Value) -> PushConfig {
	PushConfig::from_entry(&entry("01J8", options)).unwrap()
}

pub(crate) fn johns_phone() -> EntityId {
	EntityId::parse("device_tracker.johns_phone").unwrap()
}

pub(crate) fn johns_phone_at(lat: f64, lon: f64) -> EntityState {
	EntityState::new(johns_phone(), "not_home")
		.attribute("latitude", lat)
		.attribute("longitude", lon)
		.attribute("gps_accuracy", 5)
}

#[derive(Clone, Debug)]
pub(crate) enum Respond {
	Status(u16, &'static str),
	Refuse,
	Hang,
}

#[derive(Clone, Debug)]
pub(crate) struct Request {
	pub endpoint: Url,
	pub body: Value,
}

struct MockState {
	requests: Mutex<Vec<Request>>,
	respond: Mutex<Respond>,
	created: AtomicUsize,
	closes: AtomicUsize,
	fail_create: AtomicBool,
}

/// Records every request instead of sending it.
#[derive(Clone)]
pub(crate) struct MockIngest {
	state: Arc<MockState>,
}

impl Default for MockIngest {
	fn default() -> Self {
		MockIngest {
			state: Arc::new(MockState {
				requests: Mutex::new(Vec::new()),
				respond: Mutex::new(Respond::Status(200, "")),
				created: AtomicUsize::new(0),
				closes: AtomicUsize::new(0),
				fail_create: AtomicBool::new(false),
			}),
		}
	}
}

impl MockIngest {
	pub fn respond(&self, respond: Respond) {
		*self.state.respond.lock().unwrap_or_else(PoisonError::into_inner) = respond;
	}

	pub fn fail_create(&self) {
		self.state.fail_create.store(true, Ordering::SeqCst);
	}

	pub fn requests(&self) -> Vec<Request> {
		self.state.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
	}

	pub fn created(&self) -> usize {
		self.state.created.load(Ordering::SeqCst)
	}

	pub fn closes(&self) -> usize {
		self.state.closes.load(Ordering::SeqCst)
	}
}

#[derive(Debug, Error)]
pub(crate) enum MockCreateError {
	#[error("invalid options")]
	Options(#[source] DynError),

	#[error("connection pool exhausted")]
	Exhausted,
}

impl IngestProviderCreateError for MockCreateError {
	fn options(source: impl std::error::Error + Send + Sync + 'static) -> Self {
		Self::Options(DynError::new(source))
	}
}

#[derive(Debug, Error)]
pub(crate) enum MockPostError {
	#[error("client is closed")]
	Closed,

	#[error("request failed")]
	Request(#[source] io::Error),
}

#[async_trait]
impl IngestProvider for MockIngest {
	type Client = MockClient;
	type Error = MockCreateError;

	const NAME: &'static str = "mock";

	async fn create<O>(&self, options: &O) -> Result<Self::Client, Self::Error>
	where
		O: AsIngestOptions + Sync,
	{
		if self.state.fail_create.load(Ordering::SeqCst) {
			return Err(MockCreateError::Exhausted);
		}

		let options = options.ingest_options().map_err(MockCreateError::options)?;
		self.state.created.fetch_add(1, Ordering::SeqCst);

		Ok(MockClient {
			endpoint: options.endpoint,
			state: self.state.clone(),
			closed: AtomicBool::new(false),
		})
	}
}

pub(crate) struct MockClient {
	endpoint: Url,
	state: Arc<MockState>,
	closed: AtomicBool,
}

#[async_trait]
impl IngestClient for MockClient {
	type PostError = MockPostError;
	type CloseError = MockPostError;

	fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	async fn post(&self, payload: Vec<u8>) -> Result<IngestResponse, Self::PostError> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(MockPostError::Closed);
		}

		let body = serde_json::from_slice(&payload).expect("payload should be JSON");
		self
			.state
			.requests
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push(Request {
				endpoint: self.endpoint.clone(),
				body,
			});

		let respond = self.state.respond.lock().unwrap_or_else(PoisonError::into_inner).clone();
		match respond {
			Respond::Status(status, body) => Ok(IngestResponse::new(status, body)),
			Respond::Refuse => Err(MockPostError::Request(io::Error::new(
				io::ErrorKind::ConnectionRefused,
				"connection refused",
			))),
			Respond::Hang => {
				tokio::time::sleep(Duration::from_secs(60)).await;
				Ok(IngestResponse::new(200, ""))
			}
		}
	}

	async fn close(&self) -> Result<(), Self::CloseError> {
		self.closed.store(true, Ordering::SeqCst);
		self.state.closes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

/// Captured output of a thread-local `fmt` subscriber.
#[derive(Clone, Default)]
pub(crate) struct Logs(Arc<Mutex<Vec<u8>>>);

impl Logs {
	/// Captures everything logged on the current thread until the guard drops.
	pub fn capture() -> (Self, DefaultGuard) {
		let logs = Logs::default();
		let subscriber = tracing_subscriber::fmt()
			.with_writer(logs.clone())
			.with_max_level(Level::TRACE)
			.with_ansi(false)
			.without_time()
			.finish();

		let guard = tracing::subscriber::set_default(subscriber);
		(logs, guard)
	}

	pub fn contents(&self) -> String {
		String::from_utf8_lossy(&self.0.lock().unwrap_or_else(PoisonError::into_inner)).into_owned()
	}

	/// Lines logged at `level` (`"WARN"`, `"ERROR"`, ...).
	pub fn at(&self, level: &str) -> Vec<String> {
		self
			.contents()
			.lines()
			.filter(|line| line.trim_start().starts_with(level))
			.map(String::from)
			.collect()
	}
}

impl io::Write for Logs {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

impl<'a> MakeWriter<'a> for Logs {
	type Writer = Logs;

	fn make_writer(&'a self) -> Self::Writer {
		self.clone()
	}
}
