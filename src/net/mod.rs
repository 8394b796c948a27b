//! Client side of the netcode: connection lifecycle, local prediction,
//! remote interpolation and the session that ties them to the wire format.

mod connection;
mod interpolation;
mod predictor;
mod session;

pub use connection::{Connection, ConnectionError, ConnectionState, RetryPolicy};
pub use interpolation::{Interpolator, Sample, INTERPOLATION_DELAY, MAX_SAMPLES};
pub use predictor::{InputHistory, Predictor, DEFAULT_HISTORY_CAPACITY, SNAP_THRESHOLD};
pub use session::{ClientSession, SessionSettings};
