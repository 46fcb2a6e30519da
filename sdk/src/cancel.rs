use {
    crate::Error,
    std::{
        io::{self, Read},
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    },
};

/// Cooperative cancellation flag shared between a controller and running streams.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Fails every read once the token is cancelled.
#[derive(Debug)]
pub struct CancellableReader<R> {
    inner: R,
    token: CancellationToken,
}

impl<R> CancellableReader<R> {
    #[inline]
    pub fn new(inner: R, token: CancellationToken) -> Self {
        Self { inner, token }
    }

    #[inline]
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CancellableReader<R> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.token.check()?;
        self.inner.read(buf)
    }
}
