//! Region <=references=> Platform <=references=> Host.
//!
//! NA historically answers to two platform codes, hence the slice.

use crate::error::GatherError;

struct Shard {
    host: &'static str,
    platforms: &'static [&'static str],
    region: &'static str,
}

const SHARDS: &[Shard] = &[
    Shard { host: "br1.api.riotgames.com", platforms: &["BR1"], region: "BR" },
    Shard { host: "eun1.api.riotgames.com", platforms: &["EUN1"], region: "EUNE" },
    Shard { host: "euw1.api.riotgames.com", platforms: &["EUW1"], region: "EUW" },
    Shard { host: "jp1.api.riotgames.com", platforms: &["JP1"], region: "JP" },
    Shard { host: "kr.api.riotgames.com", platforms: &["KR"], region: "KR" },
    Shard { host: "la1.api.riotgames.com", platforms: &["LA1"], region: "LAN" },
    Shard { host: "la2.api.riotgames.com", platforms: &["LA2"], region: "LAS" },
    Shard { host: "na1.api.riotgames.com", platforms: &["NA1", "NA"], region: "NA" },
    Shard { host: "oc1.api.riotgames.com", platforms: &["OC1"], region: "OCE" },
    Shard { host: "tr1.api.riotgames.com", platforms: &["TR1"], region: "TR" },
    Shard { host: "ru.api.riotgames.com", platforms: &["RU"], region: "RU" },
    Shard { host: "pbe1.api.riotgames.com", platforms: &["PBE1"], region: "PBE" },
];

/// Static lookup table between the vendor's region names, platform codes and
/// API hosts. Unknown names are configuration errors, never defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionalHosts;

impl RegionalHosts {
    pub fn host_by_platform(&self, platform_name: &str) -> Result<&'static str, GatherError> {
        SHARDS
            .iter()
            .find(|shard| shard.platforms.contains(&platform_name))
            .map(|shard| shard.host)
            .ok_or_else(|| {
                GatherError::Config(format!("unconfigured platform name {platform_name}"))
            })
    }

    pub fn host_by_region(&self, region_name: &str) -> Result<&'static str, GatherError> {
        SHARDS
            .iter()
            .find(|shard| shard.region == region_name)
            .map(|shard| shard.host)
            .ok_or_else(|| GatherError::Config(format!("unconfigured region name {region_name}")))
    }

    pub fn region_by_platform(&self, platform_name: &str) -> Result<&'static str, GatherError> {
        SHARDS
            .iter()
            .find(|shard| shard.platforms.contains(&platform_name))
            .map(|shard| shard.region)
            .ok_or_else(|| {
                GatherError::Config(format!("unconfigured platform name {platform_name}"))
            })
    }

    pub fn platform_by_region(&self, region_name: &str) -> Result<&'static str, GatherError> {
        SHARDS
            .iter()
            .find(|shard| shard.region == region_name)
            .map(|shard| shard.platforms[0])
            .ok_or_else(|| GatherError::Config(format!("unconfigured region name {region_name}")))
    }

    /// All configured region names.
    pub fn region_names(&self) -> impl Iterator<Item = &'static str> {
        SHARDS.iter().map(|shard| shard.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_region_resolves() {
        let hosts = RegionalHosts;
        assert_eq!(hosts.host_by_region("EUW").unwrap(), "euw1.api.riotgames.com");
        assert_eq!(hosts.platform_by_region("NA").unwrap(), "NA1");
        assert_eq!(hosts.region_by_platform("NA").unwrap(), "NA");
        assert_eq!(hosts.host_by_platform("LA2").unwrap(), "la2.api.riotgames.com");
    }

    #[test]
    fn unknown_names_are_config_errors() {
        let hosts = RegionalHosts;
        assert!(hosts.host_by_region("MOON").is_err());
        assert!(hosts.platform_by_region("MOON").is_err());
        assert!(hosts.region_by_platform("MOON1").is_err());
        assert!(hosts.host_by_platform("MOON1").is_err());
    }

    #[test]
    fn platform_region_roundtrip() {
        let hosts = RegionalHosts;
        for region in hosts.region_names() {
            let platform = hosts.platform_by_region(region).unwrap();
            assert_eq!(hosts.region_by_platform(platform).unwrap(), region);
        }
    }
}
