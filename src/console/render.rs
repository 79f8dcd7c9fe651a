//! Plain-text rendering of query results.

use indexmap::IndexMap;

use crate::dao::models::{Games, VideoGame};

const RECORD_RULE: &str =
    "========================================================================";
const GAME_RULE: &str = "----------------------------------------------------------";
const NO_GAMES: &str = "No games were found";

/// Results grouped by creator, with the distinct years each group covers.
pub fn grouped(games: &[Games]) -> String {
    if games.is_empty() {
        return format!("{NO_GAMES}\n");
    }

    let mut groups: IndexMap<&str, Vec<&Games>> = IndexMap::new();
    for entry in games {
        groups.entry(entry.name.as_str()).or_default().push(entry);
    }

    let mut lines = Vec::new();
    for (creator, members) in groups {
        let mut years: Vec<i32> = Vec::new();
        for member in &members {
            if !years.contains(&member.year) {
                years.push(member.year);
            }
        }
        let years = years
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        lines.push(String::new());
        lines.push(RECORD_RULE.to_owned());
        lines.push(format!("Game Creator : {creator}"));
        lines.push(format!("Years        : {years}"));
        for member in members {
            push_video_games(&mut lines, &member.video_games);
        }
    }
    finish(lines)
}

/// Numbered records, one per document, in result order.
pub fn numbered(games: &[Games]) -> String {
    if games.is_empty() {
        return format!("{NO_GAMES}\n");
    }

    let mut lines = Vec::new();
    for (index, entry) in games.iter().enumerate() {
        lines.push(String::new());
        lines.push(RECORD_RULE.to_owned());
        lines.push(format!("Record No : {}", index + 1));
        lines.push(format!("Id           : {}", entry.id));
        lines.push(format!("Game Creator : {}", entry.name));
        lines.push(format!("Location     : {}", entry.location));
        lines.push(format!("Years        : {}", entry.year));
        push_video_games(&mut lines, &entry.video_games);
    }
    finish(lines)
}

/// Line announcing the token for the next page.
pub fn continuation(token: Option<&str>) -> String {
    match token {
        Some(token) => format!("Continuation token {token}\n"),
        None => "Continuation token is empty\n".to_owned(),
    }
}

fn push_video_games(lines: &mut Vec<String>, video_games: &[VideoGame]) {
    for game in video_games {
        lines.push(GAME_RULE.to_owned());
        lines.push(format!("     Game          => {}", game.name));
        lines.push(format!(
            "     Platform      => {}",
            game.platform.as_deref().unwrap_or("No Platform")
        ));
        lines.push(format!("     Release Date  => {}", game.release_date));
        lines.push(GAME_RULE.to_owned());
    }
}

fn finish(lines: Vec<String>) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creator(name: &str, year: i32, game: &str) -> Games {
        Games {
            name: name.into(),
            location: "Montreuil".into(),
            year,
            video_games: vec![VideoGame {
                name: game.into(),
                release_date: "2004".into(),
                engine: "Dunia".into(),
                platform: None,
            }],
            id: format!("{name}-{year}"),
        }
    }

    #[test]
    fn grouping_merges_creators_and_dedups_years() {
        let text = grouped(&[
            creator("Ubisoft", 1986, "Far Cry"),
            creator("EA", 1982, "FIFA"),
            creator("Ubisoft", 1986, "Rayman"),
            creator("Ubisoft", 1990, "Assassin's Creed"),
        ]);
        assert_eq!(text.matches("Game Creator : Ubisoft").count(), 1);
        assert!(text.contains("Years        : 1986,1990\n"));
        assert!(text.contains("     Game          => Rayman\n"));
        assert!(text.contains("     Platform      => No Platform\n"));
        assert!(text.find("Ubisoft").unwrap() < text.find("EA").unwrap());
    }

    #[test]
    fn empty_results_are_reported() {
        assert_eq!(grouped(&[]), "No games were found\n");
        assert_eq!(numbered(&[]), "No games were found\n");
    }

    #[test]
    fn numbered_records_start_at_one() {
        let text = numbered(&[creator("EA", 1982, "FIFA"), creator("Ubisoft", 1986, "Far Cry")]);
        assert!(text.contains("Record No : 1\n"));
        assert!(text.contains("Record No : 2\n"));
        assert!(text.contains("Location     : Montreuil\n"));
    }

    #[test]
    fn continuation_line_reports_absent_token() {
        assert_eq!(continuation(None), "Continuation token is empty\n");
        assert_eq!(continuation(Some("abc")), "Continuation token abc\n");
    }
}
