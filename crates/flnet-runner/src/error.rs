use flnet_abstract::ConfigError;
use std::io;
use thiserror::Error;

use crate::output::ParseError;

/// Everything the adapter can report to its caller.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("simulator build `{command}` failed ({exit})\nSTDERR:\n{stderr}\nSTDOUT:\n{stdout}")]
    Build {
        command: String,
        exit: String,
        stdout: String,
        stderr: String,
    },

    #[error("failed to launch `{command}`")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to collect output of `{command}`")]
    Capture {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("simulator run `{command}` failed ({exit})\nSTDERR:\n{stderr}\nSTDOUT:\n{stdout}")]
    Run {
        command: String,
        exit: String,
        stdout: String,
        stderr: String,
    },

    #[error("{source}\nCMD: {command}\nSTDERR:\n{stderr}\nSTDOUT:\n{stdout}")]
    Parse {
        command: String,
        #[source]
        source: ParseError,
        stdout: String,
        stderr: String,
    },

    #[error("{0}")]
    Usage(String),
}
