//! # Image Tools Library
//!
//! Invoca ottimizzatori di immagini esterni (jpegtran, optipng, cjpeg) su un
//! singolo file, sostituendo l'originale solo quando il tool ha successo.
//!
//! ## Architettura dei moduli:
//! - `optimizer`: protocol, command template, process runner, stream pump, profili
//! - `imaging`: decode/encode/scale/composizione tramite il crate `image`
//! - `imageops`: filtri nominati forniti da un provider scelto all'avvio
//! - `batch`: molti file con concorrenza limitata e path de-duplicati
//! - `self_test`: verifica end-to-end dei tre profili
//! - `config`, `error`, `file_manager`, `tool_resolver`, `progress`, `json_output`
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use img_tools::{Config, Optimizer};
//!
//! let optimizer = Optimizer::new(Config::default());
//! match optimizer.optimize_jpeg(&path).await? {
//!     Outcome::Replaced => println!("done"),
//!     Outcome::Failed(failure) => eprintln!("{}", failure),
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod imageops;
pub mod imaging;
pub mod json_output;
pub mod optimizer;
pub mod progress;
pub mod tool_resolver;

pub use batch::{BatchRunner, BatchSummary, FileReport, FileStatus, Profile, Reporter};
pub use config::Config;
pub use error::OptimizeError;
pub use optimizer::{run_optimizer, CommandTemplate, Failure, FailureKind, InputSource, Mode, Optimizer, Outcome};
pub use tool_resolver::ToolPathResolver;
