use async_trait::async_trait;
use reitti_ingest_provider::{
	AsIngestOptions, CONTENT_TYPE_JSON, DynError, IngestClient, IngestProvider,
	IngestProviderCreateError, IngestResponse,
};
use reqwest::header::CONTENT_TYPE;
use std::{
	convert::Infallible,
	sync::atomic::{AtomicBool, Ordering},
};
use thiserror::Error;
use tracing::{Level, instrument};
use url::Url;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ReqwestProviderCreateError {
	#[error("failed to create ingest options")]
	Options {
		#[source]
		source: DynError,
	},

	#[error("failed to create HTTP client")]
	Client {
		#[source]
		source: DynError,
	},
}

impl ReqwestProviderCreateError {
	fn client(source: impl std::error::Error + Send + Sync + 'static) -> Self {
		Self::Client {
			source: DynError::new(source),
		}
	}
}

impl IngestProviderCreateError for ReqwestProviderCreateError {
	fn options(source: impl std::error::Error + Send + Sync + 'static) -> Self {
		Self::Options {
			source: DynError::new(source),
		}
	}
}

/// Errors carry the endpoint without its query, which holds the API token.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ReqwestPostError {
	#[error("HTTP client for {endpoint} is closed")]
	Closed { endpoint: Url },

	#[error("request to {endpoint} failed")]
	Request {
		endpoint: Url,
		#[source]
		source: reqwest::Error,
	},

	#[error("failed to read response body from {endpoint}")]
	Body {
		endpoint: Url,
		#[source]
		source: reqwest::Error,
	},
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ReqwestIngest;

#[async_trait]
impl IngestProvider for ReqwestIngest {
	type Client = Client;
	type Error = ReqwestProviderCreateError;

	const NAME: &'static str = "reqwest";

	async fn create<O>(&self, options: &O) -> Result<Self::Client, Self::Error>
	where
		O: AsIngestOptions + Sync,
	{
		let options = options
			.ingest_options()
			.map_err(ReqwestProviderCreateError::options)?;

		let http = reqwest::Client::builder()
			.timeout(options.timeout)
			.build()
			.map_err(ReqwestProviderCreateError::client)?;

		let mut display_endpoint = options.endpoint.clone();
		display_endpoint.set_query(None);

		Ok(Client {
			http,
			endpoint: options.endpoint,
			display_endpoint,
			closed: AtomicBool::new(false),
		})
	}
}

pub struct Client {
	http: reqwest::Client,
	endpoint: Url,
	display_endpoint: Url,
	closed: AtomicBool,
}

impl Client {
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}
}

#[async_trait]
impl IngestClient for Client {
	type PostError = ReqwestPostError;
	type CloseError = Infallible;

	fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	#[instrument(level = Level::TRACE, name = "Client::post", skip_all, fields(bytes = payload.len()))]
	async fn post(&self, payload: Vec<u8>) -> Result<IngestResponse, Self::PostError> {
		if self.is_closed() {
			return Err(ReqwestPostError::Closed {
				endpoint: self.display_endpoint.clone(),
			});
		}

		let response = self
			.http
			.post(self.endpoint.clone())
			.header(CONTENT_TYPE, CONTENT_TYPE_JSON)
			.body(payload)
			.send()
			.await
			.map_err(|source| ReqwestPostError::Request {
				endpoint: self.display_endpoint.clone(),
				source: source.without_url(),
			})?;

		let status = response.status().as_u16();
		let body = response
			.text()
			.await
			.map_err(|source| ReqwestPostError::Body {
				endpoint: self.display_endpoint.clone(),
				source: source.without_url(),
			})?;

		Ok(IngestResponse { status, body })
	}

	/// Marks the session closed. Connections still pooled by `reqwest` are
	/// released once the last in-flight request finishes.
	async fn close(&self) -> Result<(), Self::CloseError> {
		self.closed.store(true, Ordering::Release);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use reitti_ingest_provider::IngestOptions;
	use tokio::{
		io::{AsyncReadExt, AsyncWriteExt},
		net::TcpListener,
	};

	fn options() -> IngestOptions {
		IngestOptions::new(
			Url::parse("http://127.0.0.1:9/api/v1/ingest/owntracks?token=abc").unwrap(),
		)
	}

	#[tokio::test]
	async fn keeps_endpoint() {
		let client = ReqwestIngest.create(&options()).await.expect("should create");
		assert_eq!(
			client.endpoint().as_str(),
			"http://127.0.0.1:9/api/v1/ingest/owntracks?token=abc"
		);
	}

	#[tokio::test]
	async fn post_after_close_fails_without_sending() {
		let client = ReqwestIngest.create(&options()).await.expect("should create");
		client.close().await.unwrap();
		assert!(client.is_closed());

		let err = client.post(b"{}".to_vec()).await.expect_err("should fail");
		assert!(matches!(err, ReqwestPostError::Closed { .. }));
	}

	#[tokio::test]
	async fn transport_errors_do_not_contain_the_token() {
		let options = IngestOptions::new(
			Url::parse("http://127.0.0.1:9/api/v1/ingest/owntracks?token=s3cret").unwrap(),
		);
		let client = ReqwestIngest.create(&options).await.expect("should create");

		let err = client.post(b"{}".to_vec()).await.expect_err("nothing listens on port 9");
		assert!(matches!(err, ReqwestPostError::Request { .. }));

		let chain = DynError::new(err).chain();
		assert!(chain.contains("127.0.0.1:9/api/v1/ingest/owntracks"), "{chain}");
		assert!(!chain.contains("s3cret"), "{chain}");
	}

	/// Reads one HTTP/1.1 request and returns its head and body.
	async fn read_request(stream: &mut tokio::net::TcpStream) -> (String, Vec<u8>) {
		let mut buf = Vec::new();
		let mut chunk = [0u8; 1024];
		let head_end = loop {
			let n = stream.read(&mut chunk).await.unwrap();
			assert_ne!(n, 0, "connection closed before the request head ended");
			buf.extend_from_slice(&chunk[..n]);
			if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
				break pos + 4;
			}
		};

		let head = String::from_utf8(buf[..head_end].to_vec()).unwrap();
		let length = head
			.lines()
			.find_map(|line| {
				let (name, value) = line.split_once(':')?;
				name.eq_ignore_ascii_case("content-length")
					.then(|| value.trim().parse::<usize>().unwrap())
			})
			.unwrap_or(0);

		let mut body = buf[head_end..].to_vec();
		while body.len() < length {
			let n = stream.read(&mut chunk).await.unwrap();
			assert_ne!(n, 0, "connection closed before the body ended");
			body.extend_from_slice(&chunk[..n]);
		}

		(head, body)
	}

	#[tokio::test]
	async fn posts_json_and_reads_response() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();

		let server = tokio::spawn(async move {
			let (mut stream, _) = listener.accept().await.unwrap();
			let request = read_request(&mut stream).await;
			stream
				.write_all(b"HTTP/1.1 202 Accepted\r\ncontent-length: 6\r\nconnection: close\r\n\r\nqueued")
				.await
				.unwrap();
			stream.shutdown().await.unwrap();
			request
		});

		let endpoint = format!("http://127.0.0.1:{port}/api/v1/ingest/owntracks?token=abc");
		let client = ReqwestIngest
			.create(&IngestOptions::new(Url::parse(&endpoint).unwrap()))
			.await
			.expect("should create");

		let payload = br#"{"_type":"location","tid":"JO","lat":52.1,"lon":4.3,"tst":1757844000}"#;
		let response = client.post(payload.to_vec()).await.expect("should post");
		assert_eq!(response, IngestResponse::new(202, "queued"));

		let (head, body) = server.await.unwrap();
		let mut lines = head.lines();
		assert_eq!(
			lines.next(),
			Some("POST /api/v1/ingest/owntracks?token=abc HTTP/1.1")
		);
		assert!(
			lines.any(|line| line.eq_ignore_ascii_case("content-type: application/json")),
			"{head}"
		);
		assert_eq!(body, payload);
	}
}
