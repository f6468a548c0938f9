//! # KRelay Game Data
//!
//! Read-only reference data: the backend server list and the packet id
//! table of the current game build.
//!
//! Each table is read from a local JSON file when one exists and parses,
//! and falls back to the copy bundled into the binary otherwise.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use krelay_gamedata::GameData;
//! use std::path::Path;
//!
//! let data = GameData::load(Path::new("servers.json"), Path::new("packets.json")).unwrap();
//! let usw = data.servers.lookup_user_input("usw").unwrap();
//! println!("{} is at {}", usw.name, usw.address);
//! ```

mod catalog;
mod error;
mod map;
mod servers;

pub use catalog::{PacketCatalog, PacketRecord};
pub use error::{GameDataError, Result};
pub use map::{DataRecord, GameDataMap};
pub use servers::{parse_servers, ServerMap, ServerRecord};

use std::fs;
use std::path::Path;
use tracing::{info, warn};

const BUNDLED_SERVERS: &str = include_str!("../data/servers.json");
const BUNDLED_PACKETS: &str = include_str!("../data/packets.json");

/// All reference tables used by the relay
#[derive(Debug, Clone)]
pub struct GameData {
    pub servers: ServerMap,
    pub packets: PacketCatalog,
}

impl GameData {
    /// Load every table, preferring the given local files
    pub fn load(servers_file: &Path, packets_file: &Path) -> Result<Self> {
        let servers = load_table(servers_file, BUNDLED_SERVERS, "servers", parse_servers)?;
        info!("Mapped {} servers", servers.len());

        let packets = load_table(packets_file, BUNDLED_PACKETS, "packets", PacketCatalog::from_json)?;
        info!("Mapped {} packets", packets.records().len());
        for missing in packets.missing_types() {
            warn!("No packet id for {}, it will not be intercepted", missing);
        }

        Ok(Self { servers, packets })
    }

    /// Tables bundled into the binary
    pub fn bundled() -> Result<Self> {
        Ok(Self {
            servers: parse_servers(BUNDLED_SERVERS)?,
            packets: PacketCatalog::from_json(BUNDLED_PACKETS)?,
        })
    }
}

fn load_table<T>(path: &Path, bundled: &str, what: &str, parse: impl Fn(&str) -> Result<T>) -> Result<T> {
    match fs::read_to_string(path) {
        Ok(contents) => match parse(&contents) {
            Ok(table) => {
                info!("Loaded {} from file {:?}", what, path);
                return Ok(table);
            }
            Err(e) => warn!("Ignoring {:?}: {}", path, e),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Cannot read {:?}: {}", path, e),
    }

    info!("Loaded {} from bundled data", what);
    parse(bundled)
}
