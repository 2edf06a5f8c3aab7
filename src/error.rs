//! Error types for Lyrebird

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LyrebirdError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Unknown bus \"{0}\"")]
    UnknownBus(String),

    #[error("No bus named \"master\" in the bus definition list")]
    NoMasterBus,

    #[error("Bus graph contains a cycle through \"{0}\"")]
    BusCycle(String),

    #[error("Sound bank \"{0}\" is not loaded")]
    BankNotLoaded(String),

    #[error("Invalid sound handle")]
    InvalidHandle,

    #[error("All channels are busy and the request is not high enough priority")]
    NoFreeChannel,

    #[error("Playback rejected by the mixer: {0}")]
    PlaybackFailed(String),

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("No definition named \"{0}\"")]
    DefinitionNotFound(String),

    #[error("Audio loading error: {0}")]
    AudioLoading(String),
}

pub type Result<T> = std::result::Result<T, LyrebirdError>;
