//! Adaptive candidate selection.
//!
//! The selector walks the proximity-ranked candidate list and decides which
//! server to test next. It starts near the reference point and, when the
//! local pool is exhausted before enough viable servers are found, expands
//! across continents, preferring one representative per unvisited continent
//! over a second sample from a visited one. All of its state is explicit so
//! each transition is unit-testable; nothing here touches the network.

use log::{debug, info};
use std::collections::{HashMap, HashSet};

use crate::geo::Candidate;
use crate::locations::Continent;
use crate::results::TestResult;

/// Limits and thresholds steering the search.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Stop once this many viable servers have been found.
    pub min_viable: usize,
    /// Attempt budget for the local (proximity) phase.
    pub max_servers: usize,
    /// Absolute attempt cap across both phases.
    pub hard_limit: usize,
    /// Optional distance cutoff for the local phase.
    pub max_distance_km: Option<f64>,
    /// Download threshold for a result to count as viable.
    pub min_download_mbps: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            min_viable: 5,
            max_servers: 20,
            hard_limit: 40,
            max_distance_km: None,
            min_download_mbps: 3.0,
        }
    }
}

/// Search phases. `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Calibrating,
    TestingLocal,
    TestingExpanded,
    Done,
}

/// Running viability bookkeeping, updated after every result.
#[derive(Debug, Default)]
pub struct ViabilityState {
    viable: usize,
    attempts: usize,
    tested_continents: HashSet<Continent>,
}

impl ViabilityState {
    /// Fold one result in. Holds `viable <= attempts` by construction.
    pub fn record(&mut self, result: &TestResult, min_download_mbps: f64) {
        self.attempts += 1;
        if result.is_viable(min_download_mbps) {
            self.viable += 1;
        }
        self.tested_continents.insert(result.continent);
        debug_assert!(self.viable <= self.attempts);
    }

    pub fn viable(&self) -> usize {
        self.viable
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn tested_continents(&self) -> &HashSet<Continent> {
        &self.tested_continents
    }
}

/// The adaptive selector state machine.
pub struct AdaptiveSelector {
    /// Proximity-ranked, ascending distance.
    candidates: Vec<Candidate>,
    /// Hostnames already issued for testing.
    issued: HashSet<String>,
    /// Issued candidates per continent, for expansion ordering.
    issued_by_continent: HashMap<Continent, usize>,
    phase: SearchPhase,
    viability: ViabilityState,
    config: SelectorConfig,
}

impl AdaptiveSelector {
    /// Build a selector over a proximity-ranked candidate list.
    pub fn new(candidates: Vec<Candidate>, config: SelectorConfig) -> Self {
        Self {
            candidates,
            issued: HashSet::new(),
            issued_by_continent: HashMap::new(),
            phase: SearchPhase::Calibrating,
            viability: ViabilityState::default(),
            config,
        }
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    pub fn viability(&self) -> &ViabilityState {
        &self.viability
    }

    /// Whether the run ended below the viability target.
    pub fn is_degraded(&self) -> bool {
        self.viability.viable() < self.config.min_viable
    }

    /// Calibration finished; begin drawing local candidates.
    pub fn finish_calibration(&mut self) {
        if self.phase == SearchPhase::Calibrating {
            self.phase = SearchPhase::TestingLocal;
        }
    }

    /// Fold a completed test result into the viability state.
    pub fn record(&mut self, result: &TestResult) {
        self.viability.record(result, self.config.min_download_mbps);
    }

    /// Draw the next candidate to test, or `None` when the run is over.
    ///
    /// Issued candidates are never re-issued, and the total issued never
    /// exceeds the hard limit.
    pub fn next_candidate(&mut self) -> Option<Candidate> {
        if self.phase == SearchPhase::Calibrating || self.phase == SearchPhase::Done {
            return None;
        }

        if self.viability.viable() >= self.config.min_viable {
            info!("Found {} viable server(s); stopping the search", self.viability.viable());
            self.phase = SearchPhase::Done;
            return None;
        }

        if self.issued.len() >= self.config.hard_limit {
            info!("Reached the hard limit of {} attempts", self.config.hard_limit);
            self.phase = SearchPhase::Done;
            return None;
        }

        if self.phase == SearchPhase::TestingLocal {
            let local_budget_left = self.issued.len() < self.config.max_servers;
            if local_budget_left {
                if let Some(candidate) = self.next_local() {
                    return Some(self.issue(candidate));
                }
            }

            info!("Local candidate pool exhausted; expanding the search across continents");
            self.phase = SearchPhase::TestingExpanded;
        }

        match self.next_expanded() {
            Some(candidate) => Some(self.issue(candidate)),
            None => {
                info!("No untested candidates remain anywhere");
                self.phase = SearchPhase::Done;
                None
            }
        }
    }

    fn issue(&mut self, candidate: Candidate) -> Candidate {
        self.issued.insert(candidate.location.hostname.clone());
        *self.issued_by_continent.entry(candidate.location.continent).or_insert(0) += 1;
        debug!(
            "Issuing {} ({}, {:.0} km) in phase {:?}",
            candidate.location.hostname, candidate.location.continent, candidate.distance_km, self.phase
        );
        candidate
    }

    /// Nearest untested candidate within the local distance cutoff.
    fn next_local(&self) -> Option<Candidate> {
        self.candidates
            .iter()
            .filter(|c| !self.issued.contains(&c.location.hostname))
            .find(|c| match self.config.max_distance_km {
                Some(limit) => c.distance_km <= limit,
                None => true,
            })
            .cloned()
    }

    /// Expansion draw: continents ordered by fewest already-issued
    /// candidates, then by the distance of their nearest untested
    /// candidate; within the chosen continent, nearest first.
    fn next_expanded(&self) -> Option<Candidate> {
        let mut best: Option<(usize, f64, &Candidate)> = None;

        for candidate in &self.candidates {
            if self.issued.contains(&candidate.location.hostname) {
                continue;
            }

            let issued_here =
                self.issued_by_continent.get(&candidate.location.continent).copied().unwrap_or(0);

            // Candidates are distance-sorted, so the first untested one per
            // continent is that continent's nearest representative.
            let candidate_key = (issued_here, candidate.distance_km);
            let improves = match best {
                None => true,
                Some((count, distance, _)) => candidate_key < (count, distance),
            };

            if improves {
                best = Some((issued_here, candidate.distance_km, candidate));
            }
        }

        best.map(|(_, _, candidate)| candidate.clone())
    }
}
