use crate::error::GateError;
use crate::gate::AdmissionGate;
use futures::future::poll_fn;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Error returned by [`GateService`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GatedError<E> {
    /// No permit was granted; the inner service was never called.
    #[error(transparent)]
    Gate(GateError),
    /// The inner service failed after admission.
    #[error("{0}")]
    Inner(E),
}

impl<E> GatedError<E> {
    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Gate(_) => None,
        }
    }
}

/// A layer that admits every request through an [`AdmissionGate`].
#[derive(Clone, Debug)]
pub struct GateLayer {
    gate: AdmissionGate,
}

impl GateLayer {
    /// Create a new gate layer. Services built from it share `gate`.
    pub fn new(gate: AdmissionGate) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for GateLayer {
    type Service = GateService<S>;

    fn layer(&self, service: S) -> Self::Service {
        GateService { inner: service, gate: self.gate.clone() }
    }
}

/// Middleware service that waits for a permit before calling the inner service.
///
/// The inner service is driven to readiness only after admission, on a clone,
/// so capacity it reserves in `poll_ready` is never held across a gate wait.
/// `poll_ready` on this service is therefore always ready.
#[derive(Clone, Debug)]
pub struct GateService<S> {
    inner: S,
    gate: AdmissionGate,
}

impl<S, Req> Service<Req> for GateService<S>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = GatedError<S::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let gate = self.gate.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            gate.acquire().await.map_err(GatedError::Gate)?;
            poll_fn(|cx| inner.poll_ready(cx)).await.map_err(GatedError::Inner)?;
            inner.call(req).await.map_err(GatedError::Inner)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::RateWindow;
    use std::convert::Infallible;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    #[tokio::test(start_paused = true)]
    async fn requests_past_capacity_are_delayed() {
        let gate = AdmissionGate::new(RateWindow::new(2, Duration::from_secs(1)).unwrap()).unwrap();
        let svc = GateLayer::new(gate).layer(service_fn(|n: u32| async move {
            Ok::<_, Infallible>((n, tokio::time::Instant::now()))
        }));

        let start = tokio::time::Instant::now();
        let mut stamps = Vec::new();
        for n in 0..3 {
            let (echo, at) = svc.clone().oneshot(n).await.unwrap();
            assert_eq!(echo, n);
            stamps.push(at - start);
        }

        assert!(stamps[1] < Duration::from_millis(5));
        assert!(stamps[2] > Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_request_holds_no_inner_capacity() {
        let window = RateWindow::new(1, Duration::from_secs(1)).unwrap();
        let limited = ServiceBuilder::new()
            .concurrency_limit(1)
            .service(service_fn(|n: u32| async move { Ok::<_, Infallible>(n) }));
        let svc = GateLayer::new(AdmissionGate::new(window).unwrap()).layer(limited.clone());

        assert_eq!(svc.clone().oneshot(1).await.unwrap(), 1);
        let waiting = tokio::spawn(svc.clone().oneshot(2));
        tokio::task::yield_now().await;

        // The gated request is parked for a full window; the limit's only slot stays free.
        let direct = tokio::time::timeout(Duration::from_millis(10), limited.oneshot(3)).await;
        assert_eq!(direct.expect("inner slot available").unwrap(), 3);
        assert_eq!(waiting.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn shut_down_gate_skips_inner_service() {
        let gate = AdmissionGate::new(RateWindow::per_second(10).unwrap()).unwrap();
        gate.shutdown();
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = GateLayer::new(gate).layer(service_fn({
            let calls = calls.clone();
            move |_: ()| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<(), Infallible>(()) }
            }
        }));

        let err = svc.oneshot(()).await.unwrap_err();
        assert_eq!(err, GatedError::Gate(GateError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "inner service must not run");
    }

    #[tokio::test]
    async fn inner_errors_are_wrapped() {
        let gate = AdmissionGate::new(RateWindow::per_second(10).unwrap()).unwrap();
        let svc = GateLayer::new(gate).layer(service_fn(|_: ()| async {
            Err::<(), _>(io::Error::new(io::ErrorKind::Other, "boom"))
        }));

        let err = svc.oneshot(()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(err.into_inner().is_some());
    }
}
