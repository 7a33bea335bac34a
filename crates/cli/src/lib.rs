//! Library side of the `ows` binary: configuration file handling and the
//! filesystem-backed host (directory library, command transcoder, folder
//! artwork lookup)

pub mod host;
pub mod system_config;
pub mod util;
