//! Centralized location for vendor and static-data CDN URL templates.
//!
//! Every vendor endpoint belongs to a rate-limit class; the class string is
//! the method key recorded in the request ledger.

/// Ranked solo queue, the only queue the gatherer observes.
pub const RANKED_SOLO_QUEUE: u32 = 420;

pub const METHOD_SUMMONER_BY_NAME: &str = "/lol/summoner/v3/summoners/by-name/{summonerName}";
pub const METHOD_TIERS: &str = "leagues-v3 endpoints";
pub const METHOD_MATCHLIST: &str = "/lol/match/v3/matchlists/by-account/{accountId}";
pub const METHOD_MATCH_AND_TIMELINE: &str = "/lol/match/v3/[matches,timelines]";
pub const METHOD_OTHER: &str = "All other endpoints";

pub fn summoner_by_name(api_host: &str, name: &str, api_key: &str) -> String {
    format!("https://{api_host}/lol/summoner/v3/summoners/by-name/{name}?api_key={api_key}")
}

pub fn tiers_by_summoner_id(api_host: &str, summoner_id: i64, api_key: &str) -> String {
    format!("https://{api_host}/lol/league/v3/positions/by-summoner/{summoner_id}?api_key={api_key}")
}

pub fn spectator_by_summoner_id(api_host: &str, summoner_id: i64, api_key: &str) -> String {
    format!(
        "https://{api_host}/lol/spectator/v3/active-games/by-summoner/{summoner_id}?api_key={api_key}"
    )
}

pub fn matchlist_by_account_id(
    api_host: &str,
    account_id: i64,
    api_key: &str,
    end_time_ms: i64,
    begin_time_ms: i64,
) -> String {
    format!(
        "https://{api_host}/lol/match/v3/matchlists/by-account/{account_id}?queue={RANKED_SOLO_QUEUE}&api_key={api_key}&endTime={end_time_ms}&beginTime={begin_time_ms}"
    )
}

pub fn match_by_match_id(api_host: &str, match_id: i64, api_key: &str) -> String {
    format!("https://{api_host}/lol/match/v3/matches/{match_id}?api_key={api_key}")
}

pub fn timeline_by_match_id(api_host: &str, match_id: i64, api_key: &str) -> String {
    format!("https://{api_host}/lol/match/v3/timelines/by-match/{match_id}?api_key={api_key}")
}

// Static-data CDN; unmetered, so none of these carry a method key.

pub const VERSIONS: &str = "https://ddragon.leagueoflegends.com/api/versions.json";

pub fn profile_icons(version_id: &str) -> String {
    format!("http://ddragon.leagueoflegends.com/cdn/{version_id}/data/en_US/profileicon.json")
}

pub fn champions_list(version_id: &str) -> String {
    format!("http://ddragon.leagueoflegends.com/cdn/{version_id}/data/en_US/champion.json")
}

pub fn items(version_id: &str) -> String {
    format!("http://ddragon.leagueoflegends.com/cdn/{version_id}/data/en_US/item.json")
}

pub fn summonerspells(version_id: &str) -> String {
    format!("http://ddragon.leagueoflegends.com/cdn/{version_id}/data/en_US/summoner.json")
}

pub fn runes(version_id: &str) -> String {
    format!("http://ddragon.leagueoflegends.com/cdn/{version_id}/data/en_US/runesReforged.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matchlist_url_carries_window_and_queue() {
        let url = matchlist_by_account_id("euw1.api.riotgames.com", 123, "KEY", 2000, 1000);
        assert!(url.contains("queue=420"));
        assert!(url.contains("endTime=2000"));
        assert!(url.contains("beginTime=1000"));
        assert!(url.starts_with("https://euw1.api.riotgames.com/lol/match/v3/matchlists/by-account/123"));
    }

    #[test]
    fn cdn_urls_embed_version() {
        assert!(items("8.24.1").contains("/cdn/8.24.1/"));
        assert!(runes("8.24.1").ends_with("runesReforged.json"));
    }
}
