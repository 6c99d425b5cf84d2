//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della libreria.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` enum per gli errori *fatali* del protocollo
//! - Integra con `thiserror` per automatic error conversion
//! - Mantiene separati gli errori fatali dagli esiti di fallimento recuperabili
//!
//! ## Fatale vs recuperabile:
//! Un tool che termina con exit code != 0, o che produce un'immagine vuota,
//! **non** è un errore: diventa un `Outcome::Failed` con il messaggio del tool
//! (vedi `optimizer::protocol`). Gli errori di questo modulo indicano invece
//! che non è stato possibile nemmeno eseguire il protocollo, oppure che il
//! workspace è corrotto (cancellazione del file temporaneo fallita).
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O (permessi, disco pieno, etc.)
//! - `Image`: Errori del toolkit immagini (decode/encode)
//! - `Spawn`: Eseguibile esterno mancante o non avviabile
//! - `InvalidImage`: Il file sorgente non è un'immagine valida
//! - `Export`: Conversione verso un formato intermedio fallita
//! - `Cleanup`: Cancellazione del file temporaneo fallita
//! - `Unsupported`: Capability non disponibile nel provider corrente
//! - `Validation`: Errori di validazione input
//!
//! ## Esempio:
//! ```rust,ignore
//! if !img_loaded {
//!     return Err(OptimizeError::InvalidImage(path.to_path_buf()));
//! }
//! ```

use std::path::PathBuf;

/// Custom error types for image optimization
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a valid image file", .0.display())]
    InvalidImage(PathBuf),

    #[error("Failed to export image to {format}: {reason}")]
    Export { format: String, reason: String },

    #[error("Failed to remove temporary artifact {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} is not supported by the {provider} image provider")]
    Unsupported {
        operation: &'static str,
        provider: &'static str,
    },

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T, E = OptimizeError> = std::result::Result<T, E>;
