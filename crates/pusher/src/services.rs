use futures::{FutureExt, future::BoxFuture};
use serde_json::{Map, Value};
use std::{
	collections::BTreeMap,
	fmt,
	future::Future,
	sync::{Arc, Mutex, PoisonError},
};
use thiserror::Error;
use tracing::{Level, debug, instrument};

#[derive(Clone, Debug, PartialEq)]
pub struct ServiceCall {
	pub domain: String,
	pub service: String,
	pub data: Map<String, Value>,
}

#[non_exhaustive]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
	#[error("service {domain}.{service} not found")]
	NotFound { domain: String, service: String },

	#[error("config entry '{entry_id}' is not loaded")]
	UnknownEntry { entry_id: String },

	#[error("service data field '{key}' must be {expected}")]
	InvalidData {
		key: &'static str,
		expected: &'static str,
	},
}

type Handler = Arc<dyn Fn(ServiceCall) -> BoxFuture<'static, Result<(), ServiceError>> + Send + Sync>;

/// Registry of callable services, keyed by `(domain, service)`.
///
/// Cloning is cheap and every clone shares the same registry.
#[derive(Clone, Default)]
pub struct Services {
	handlers: Arc<Mutex<BTreeMap<(String, String), Handler>>>,
}

impl fmt::Debug for Services {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
		f.debug_set()
			.entries(handlers.keys().map(|(domain, service)| format!("{domain}.{service}")))
			.finish()
	}
}

impl Services {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn has_service(&self, domain: &str, service: &str) -> bool {
		self
			.handlers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.contains_key(&(domain.to_owned(), service.to_owned()))
	}

	/// Registers `handler`, replacing any previous handler of the same service.
	pub fn register<F, Fut>(&self, domain: &str, service: &str, handler: F)
	where
		F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
	{
		let handler: Handler = Arc::new(move |call: ServiceCall| handler(call).boxed());
		self
			.handlers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.insert((domain.to_owned(), service.to_owned()), handler);

		debug!(domain, service, "registered service");
	}

	/// Returns whether the service was registered.
	pub fn remove(&self, domain: &str, service: &str) -> bool {
		let removed = self
			.handlers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(&(domain.to_owned(), service.to_owned()))
			.is_some();

		if removed {
			debug!(domain, service, "removed service");
		}

		removed
	}

	#[instrument(level = Level::DEBUG, name = "Services::call", skip(self, data))]
	pub async fn call(
		&self,
		domain: &str,
		service: &str,
		data: Map<String, Value>,
	) -> Result<(), ServiceError> {
		let handler = self
			.handlers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.get(&(domain.to_owned(), service.to_owned()))
			.cloned()
			.ok_or_else(|| ServiceError::NotFound {
				domain: domain.to_owned(),
				service: service.to_owned(),
			})?;

		handler(ServiceCall {
			domain: domain.to_owned(),
			service: service.to_owned(),
			data,
		})
		.await
	}
}
