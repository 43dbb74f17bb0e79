//! Vehicle lifecycle sequencing and the command transport it drives.

pub mod error;
pub mod opendji;
pub mod sequencer;
pub mod state;
pub mod transport;

pub use error::FlightError;
pub use opendji::{LinkConfig, OpenDjiLink};
pub use sequencer::{FlightSequencer, RetryPolicy, SequencerConfig, SequencerStats};
pub use state::FlightState;
pub use transport::{Ack, VehicleTransport};
