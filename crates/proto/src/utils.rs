use std::{
  convert::{TryFrom, TryInto},
  fmt,
  future::Future,
  path::PathBuf,
};
use tracing::{field, Span};

pub(crate) trait Record: Sized {
  fn record_field(self, field: &'static str) -> Self;

  #[inline]
  fn record_request(self) -> Self {
    self.record_field("request")
  }

  #[inline]
  fn record_response(self) -> Self {
    self.record_field("response")
  }
}

impl<T: fmt::Debug> Record for T {
  #[inline]
  fn record_field(self, field: &'static str) -> Self {
    Span::current().record(field, &field::debug(&self));
    self
  }
}

#[inline]
pub(crate) fn record_request<T: fmt::Debug>(request: T) -> T {
  request.record_request()
}

/// Logs a failed call inside the current span and hands the status back.
pub(crate) fn record_status<E: Into<tonic::Status>>(error: E) -> tonic::Status {
  let status = error.into();
  tracing::warn!(code = ?status.code(), message = status.message(), "request failed");
  status
}

/// One unary call through a role trait: validates and records the wire
/// request, runs `call`, then records the answer or logs the failure.
pub(crate) async fn dispatch<P, Req, Res, E, F, Fut>(
  request: tonic::Request<P>,
  call: F,
) -> Result<Res, tonic::Status>
where
  P: TryInto<Req, Error = tonic::Status>,
  Req: fmt::Debug,
  Res: fmt::Debug,
  E: Into<tonic::Status>,
  F: FnOnce(Req) -> Fut,
  Fut: Future<Output = Result<Res, E>>,
{
  let request = record_request(request.into_inner().try_into()?);
  match call(request).await {
    Ok(response) => Ok(response.record_response()),
    Err(e) => Err(record_status(e)),
  }
}

/// Converts an unsigned size to the wire's `int64`, clamping at
/// `i64::MAX`.
#[inline]
pub(crate) fn wire_i64(value: u64) -> i64 {
  i64::try_from(value).unwrap_or(i64::MAX)
}

/// Rejects an empty required string field with `InvalidArgument`.
pub(crate) fn required(value: String, error: &'static str) -> Result<String, tonic::Status> {
  if value.is_empty() {
    Err(tonic::Status::invalid_argument(error))
  } else {
    Ok(value)
  }
}

/// Parses a required absolute path field.
pub(crate) fn absolute_path(value: String, field: &'static str) -> Result<PathBuf, tonic::Status> {
  if value.is_empty() {
    return Err(tonic::Status::invalid_argument(format!("{} is empty", field)));
  }

  let path = PathBuf::from(value);
  if !path.is_absolute() {
    return Err(tonic::Status::invalid_argument(format!(
      "{} is not absolute",
      field
    )));
  }

  Ok(path)
}
