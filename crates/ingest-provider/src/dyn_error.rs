use std::{error::Error, fmt};

/// Type-erased error used as the `source` of the workspace's error enums.
pub struct DynError(Box<dyn Error + Send + Sync + 'static>);

impl DynError {
	pub fn new<E: Error + Send + Sync + 'static>(error: E) -> Self {
		Self(Box::new(error))
	}

	pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
		self.0.downcast_ref()
	}

	/// The error followed by all of its sources, joined with `: `.
	pub fn chain(&self) -> String {
		let mut out = self.0.to_string();
		let mut source = self.0.source();
		while let Some(err) = source {
			out.push_str(": ");
			out.push_str(&err.to_string());
			source = err.source();
		}

		out
	}
}

impl fmt::Debug for DynError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&*self.0, f)
	}
}

impl fmt::Display for DynError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&*self.0, f)
	}
}

impl Error for DynError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		self.0.source()
	}
}
