//! # Optimizer Module
//!
//! Protocol per invocare un ottimizzatore esterno su un singolo file,
//! separato in sottomoduli:
//! - `command`: template degli argomenti con slot nominati per input/output
//! - `workspace`: file temporaneo nella stessa directory e relativo cleanup
//! - `runner`: avvio del processo nella directory del file
//! - `pump`: copia concorrente stdin/stdout per i tool in modalità filter
//! - `protocol`: macchina a stati che decide se sostituire l'originale
//! - `profiles`: command line fisse per jpegtran, optipng e cjpeg

pub mod command;
pub mod profiles;
pub mod protocol;
pub mod pump;
pub mod runner;
pub mod workspace;

pub use command::{Arg, CommandMode, CommandTemplate};
pub use profiles::{clamp_quality, Optimizer};
pub use protocol::{run_optimizer, Failure, FailureKind, Mode, Outcome};
pub use pump::{InputSource, PumpTask};
pub use workspace::TempArtifact;
