//! Acquiring and releasing the broker transport.

use rand::RngCore;

use super::error::{RetryOperation, SessionError};
use crate::network::{Close, Connect, Connection, Read, Shutdown};
use crate::retry::{Delay, RetryConfig, RetryState, RetryStatus};

/// Open a transport to `host:port`, retrying with backoff.
///
/// A failed attempt leaves nothing behind, so every retry starts from a fresh
/// connection. After `retry.max_attempts` failures the operation gives up with
/// [`SessionError::RetriesExhausted`].
pub fn connect_with_retry<N, D, R>(
    network: &mut N,
    host: &str,
    port: u16,
    retry: RetryConfig,
    delay: &mut D,
    rng: &mut R,
) -> Result<N::Connection, SessionError>
where
    N: Connect + ?Sized,
    D: Delay + ?Sized,
    R: RngCore + ?Sized,
{
    let mut state = RetryState::new(retry);
    loop {
        info!("Connecting to {}:{}.", host, port);
        match network.connect(host, port) {
            Ok(connection) => {
                info!("Transport to {}:{} established.", host, port);
                return Ok(connection);
            }
            Err(_) => warn!("Connection to {}:{} failed.", host, port),
        }

        if state.backoff_and_sleep(delay, rng) == RetryStatus::RetriesExhausted {
            error!(
                "Giving up on {}:{} after {} attempts.",
                host,
                port,
                state.attempts_done()
            );
            return Err(SessionError::RetriesExhausted(RetryOperation::Connect));
        }
    }
}

/// Shut a transport down and release it.
///
/// The write side is half-closed first, then the transport is read until the
/// peer closes its side or `max_loops` polls have been made, sleeping
/// `poll_delay_ms` between polls. The transport is closed in every case and
/// `transport` is left `None`, so a second call does nothing.
pub fn graceful_close<C, D>(transport: &mut Option<C>, delay: &mut D, max_loops: u32, poll_delay_ms: u32)
where
    C: Connection,
    D: Delay + ?Sized,
{
    let Some(mut connection) = transport.take() else {
        debug!("Transport already released.");
        return;
    };

    if Shutdown::shutdown(&mut connection).is_err() {
        warn!("Half-close failed, closing anyway.");
    }

    let mut scratch = [0u8; 32];
    for _ in 0..max_loops {
        match Read::read(&mut connection, &mut scratch) {
            Err(_) => {
                debug!("Peer closed the connection.");
                break;
            }
            Ok(_) => delay.delay_ms(poll_delay_ms),
        }
    }

    if Close::close(connection).is_err() {
        warn!("Transport close reported an error.");
    }
}
