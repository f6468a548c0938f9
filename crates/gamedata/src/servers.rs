//! Game server list

use super::map::{DataRecord, GameDataMap};
use super::error::Result;
use serde::{Deserialize, Serialize};

/// One backend game server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    /// Full name, e.g. `USWest`
    pub name: String,
    /// Short name, e.g. `USW`
    pub abbreviation: String,
    /// Numeric address of the server
    pub address: String,
}

impl DataRecord for ServerRecord {
    type Id = String;

    fn id(&self) -> String {
        self.abbreviation.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Server list keyed by abbreviation
pub type ServerMap = GameDataMap<ServerRecord>;

/// Parse a server list from its JSON form
///
/// ```json
/// [{ "name": "USWest", "abbreviation": "USW", "address": "54.193.0.1" }]
/// ```
pub fn parse_servers(json: &str) -> Result<ServerMap> {
    let records: Vec<ServerRecord> = serde_json::from_str(json)?;
    Ok(GameDataMap::new(records))
}

impl ServerMap {
    /// Record whose address equals `address`, if exactly one does
    pub fn by_address(&self, address: &str) -> Option<&ServerRecord> {
        self.find(|s| s.address == address).ok()
    }

    /// Resolve what a player typed: abbreviation or full name, case-insensitive
    ///
    /// Fails with `NotFound` or `Ambiguous` unless exactly one server matches.
    pub fn lookup_user_input(&self, input: &str) -> Result<&ServerRecord> {
        let wanted = input.to_uppercase();
        self.find(|s| s.abbreviation.to_uppercase() == wanted || s.name.to_uppercase() == wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GameDataError;

    const SERVERS: &str = r#"[
        { "name": "USWest", "abbreviation": "USW", "address": "10.0.0.1" },
        { "name": "USEast", "abbreviation": "USE", "address": "10.0.0.2" },
        { "name": "EUWest", "abbreviation": "EUW", "address": "10.0.0.3" }
    ]"#;

    #[test]
    fn test_parse_and_lookup() {
        let servers = parse_servers(SERVERS).unwrap();
        assert_eq!(servers.len(), 3);
        assert_eq!(servers.by_id(&"USE".to_string()).unwrap().name, "USEast");
        assert_eq!(servers.by_name("EUWest").unwrap().address, "10.0.0.3");
        assert_eq!(servers.by_address("10.0.0.1").unwrap().abbreviation, "USW");
        assert!(servers.by_address("10.9.9.9").is_none());
    }

    #[test]
    fn test_user_input_matching() {
        let servers = parse_servers(SERVERS).unwrap();
        assert_eq!(servers.lookup_user_input("usw").unwrap().name, "USWest");
        assert_eq!(servers.lookup_user_input("useast").unwrap().abbreviation, "USE");
        assert!(matches!(servers.lookup_user_input("asia"), Err(GameDataError::NotFound(_))));
    }

    #[test]
    fn test_name_colliding_with_abbreviation_is_ambiguous() {
        let servers = parse_servers(
            r#"[
                { "name": "USW", "abbreviation": "US1", "address": "10.0.0.1" },
                { "name": "USWest", "abbreviation": "USW", "address": "10.0.0.2" }
            ]"#,
        )
        .unwrap();
        assert!(matches!(servers.lookup_user_input("USW"), Err(GameDataError::Ambiguous(_))));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(parse_servers("{ nope"), Err(GameDataError::Json(_))));
    }
}
