//! Admin commands and their execution against a bracket manager.

use std::time::Instant;

use anyhow::{Context, bail};
use bracket_engine::bracket::{CompetitorId, MatchId, StageId};
use bracket_engine::{BracketManager, Match, MatchStatus};
use log::info;
use rand::Rng;
use serde::Serialize;
use serde_json::{Value, json};

use crate::logging::log_performance;

/// Upper bound on simulated matches, well above the 62 + 1 a 32 bracket needs
const MAX_SIMULATED_MATCHES: usize = 256;

/// One admin command, parsed from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Generate {
        stage: StageId,
        size: Option<u32>,
        competitors: Vec<CompetitorId>,
    },
    Report {
        match_id: MatchId,
        score_a: i32,
        score_b: i32,
        winner: CompetitorId,
    },
    Forfeit {
        match_id: MatchId,
        winner: CompetitorId,
    },
    Progress {
        match_id: MatchId,
    },
    Status {
        match_id: MatchId,
        status: MatchStatus,
    },
    Show {
        stage: StageId,
    },
    Playable {
        stage: StageId,
    },
    Reset {
        stage: StageId,
    },
    Simulate {
        stage: StageId,
        size: Option<u32>,
        competitors: Vec<CompetitorId>,
    },
}

impl Command {
    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Generate { .. } => "generate",
            Command::Report { .. } => "report",
            Command::Forfeit { .. } => "forfeit",
            Command::Progress { .. } => "progress",
            Command::Status { .. } => "status",
            Command::Show { .. } => "show",
            Command::Playable { .. } => "playable",
            Command::Reset { .. } => "reset",
            Command::Simulate { .. } => "simulate",
        }
    }
}

/// Outcome of a simulated stage
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub stage_id: StageId,
    pub matches_played: usize,
    pub bracket_reset: bool,
    pub champion: Option<CompetitorId>,
}

/// Parse a comma separated competitor list such as `1,2,3`
pub fn parse_competitors(value: &str) -> Result<Vec<CompetitorId>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<CompetitorId>()
                .map_err(|_| format!("invalid competitor id '{part}'"))
        })
        .collect()
}

/// Parse a score such as `2-1`
pub fn parse_score(value: &str) -> Result<(i32, i32), String> {
    let (a, b) = value
        .split_once('-')
        .ok_or_else(|| format!("score '{value}' must look like 2-1"))?;
    let a = a.trim().parse().map_err(|_| format!("invalid score '{a}'"))?;
    let b = b.trim().parse().map_err(|_| format!("invalid score '{b}'"))?;
    Ok((a, b))
}

/// Parse a status accepted by `set_status`
pub fn parse_status(value: &str) -> Result<MatchStatus, String> {
    MatchStatus::parse(value).ok_or_else(|| format!("unknown match status '{value}'"))
}

/// Run a command and return its JSON output
pub async fn run(
    manager: &BracketManager,
    command: Command,
    default_size: u32,
) -> anyhow::Result<Value> {
    let started = Instant::now();
    let name = command.name();

    let output = match command {
        Command::Generate {
            stage,
            size,
            competitors,
        } => {
            let summary = manager
                .generate(stage, &competitors, size.unwrap_or(default_size))
                .await
                .with_context(|| format!("Failed to generate stage {stage}"))?;
            serde_json::to_value(summary)?
        }
        Command::Report {
            match_id,
            score_a,
            score_b,
            winner,
        } => {
            let result = manager
                .report_result(match_id, score_a, score_b, winner)
                .await
                .with_context(|| format!("Failed to report match {match_id}"))?;
            serde_json::to_value(result)?
        }
        Command::Forfeit { match_id, winner } => {
            let result = manager
                .record_forfeit(match_id, winner)
                .await
                .with_context(|| format!("Failed to forfeit match {match_id}"))?;
            serde_json::to_value(result)?
        }
        Command::Progress { match_id } => {
            let result = manager
                .progress(match_id)
                .await
                .with_context(|| format!("Failed to progress match {match_id}"))?;
            serde_json::to_value(result)?
        }
        Command::Status { match_id, status } => {
            let m = manager.set_status(match_id, status).await?;
            serde_json::to_value(m)?
        }
        Command::Show { stage } => {
            let overview = manager.stage_overview(stage).await?;
            let champion = manager.champion(stage).await?;
            json!({ "stage_id": stage, "champion": champion, "brackets": overview })
        }
        Command::Playable { stage } => serde_json::to_value(manager.playable_matches(stage).await?)?,
        Command::Reset { stage } => {
            let deleted = manager.delete_stage(stage).await?;
            json!({ "stage_id": stage, "brackets_deleted": deleted })
        }
        Command::Simulate {
            stage,
            size,
            competitors,
        } => {
            if !competitors.is_empty() {
                manager
                    .generate(stage, &competitors, size.unwrap_or(default_size))
                    .await
                    .with_context(|| format!("Failed to generate stage {stage}"))?;
            }
            serde_json::to_value(simulate(manager, stage).await?)?
        }
    };

    log_performance(name, started.elapsed().as_millis() as u64, None);
    Ok(output)
}

/// Report random results for every playable match until the stage has a champion
pub async fn simulate(manager: &BracketManager, stage: StageId) -> anyhow::Result<SimulationReport> {
    let mut matches_played = 0;
    let mut bracket_reset = false;

    loop {
        let playable = manager.playable_matches(stage).await?;
        let Some(next) = playable.first() else {
            break;
        };
        if matches_played >= MAX_SIMULATED_MATCHES {
            bail!("Stage {stage} still has playable matches after {matches_played} results");
        }

        let (winner, score_a, score_b) = random_result(next)?;
        let result = manager
            .report_result(next.id, score_a, score_b, winner)
            .await?;
        matches_played += 1;
        bracket_reset |= result.bracket_reset_created;

        if let Some(champion) = result.champion {
            info!("Stage {} simulated, champion {}", stage, champion);
        }
    }

    Ok(SimulationReport {
        stage_id: stage,
        matches_played,
        bracket_reset,
        champion: manager.champion(stage).await?,
    })
}

fn random_result(m: &Match) -> anyhow::Result<(CompetitorId, i32, i32)> {
    let (Some(a), Some(b)) = (m.slot_a.competitor(), m.slot_b.competitor()) else {
        bail!("Match {} is not ready to be played", m.id);
    };

    let mut rng = rand::rng();
    let loser_score = rng.random_range(0..2);
    Ok(if rng.random_bool(0.5) {
        (a, 2, loser_score)
    } else {
        (b, loser_score, 2)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bracket_engine::EngineConfig;
    use bracket_engine::db::MemoryBracketStore;
    use std::sync::Arc;

    fn manager() -> BracketManager {
        BracketManager::new(Arc::new(MemoryBracketStore::new()), EngineConfig::default())
    }

    #[test]
    fn test_parse_competitors() {
        assert_eq!(parse_competitors("1,2, 3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_competitors("4,").unwrap(), vec![4]);
        assert!(parse_competitors("1,x").is_err());
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("2-1").unwrap(), (2, 1));
        assert_eq!(parse_score(" 0 - 3 ").unwrap(), (0, 3));
        assert!(parse_score("21").is_err());
        assert!(parse_score("a-1").is_err());
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("in_progress").unwrap(), MatchStatus::InProgress);
        assert!(parse_status("finished").is_err());
    }

    #[tokio::test]
    async fn test_generate_then_show() {
        let manager = manager();
        let output = run(
            &manager,
            Command::Generate {
                stage: 3,
                size: None,
                competitors: vec![1, 2, 3, 4, 5, 6, 7, 8],
            },
            8,
        )
        .await
        .unwrap();
        assert_eq!(output["match_count"], 14);

        let shown = run(&manager, Command::Show { stage: 3 }, 8).await.unwrap();
        assert_eq!(shown["brackets"].as_array().unwrap().len(), 3);
        assert!(shown["champion"].is_null());
    }

    #[tokio::test]
    async fn test_simulate_crowns_a_champion() {
        let manager = manager();
        let competitors: Vec<CompetitorId> = (1..=11).collect();
        let output = run(
            &manager,
            Command::Simulate {
                stage: 1,
                size: Some(16),
                competitors: competitors.clone(),
            },
            8,
        )
        .await
        .unwrap();

        let champion = output["champion"].as_i64().unwrap();
        assert!(competitors.contains(&champion));
        assert!(manager.playable_matches(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_deletes_stage() {
        let manager = manager();
        manager.generate(2, &[1, 2, 3, 4], 4).await.unwrap();

        let output = run(&manager, Command::Reset { stage: 2 }, 8).await.unwrap();
        assert_eq!(output["brackets_deleted"], 3);
        assert!(manager.stage_overview(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_report_unknown_match_fails() {
        let manager = manager();
        let err = run(
            &manager,
            Command::Report {
                match_id: 999,
                score_a: 1,
                score_b: 0,
                winner: 1,
            },
            8,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("999"));
    }
}
