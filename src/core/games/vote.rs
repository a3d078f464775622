//! Room polls: one ballot per nickname per poll

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::core::event::{RoomName, Tally};

#[derive(Debug, Clone)]
struct Vote {
    question: String,
    tally: Tally,
    voters: HashSet<String>,
}

#[derive(Default)]
pub struct VoteBook {
    votes: RwLock<HashMap<RoomName, Vote>>,
}

impl VoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new poll in `room`. Duplicate options collapse into the first
    /// occurrence; the returned list is the option order used for results.
    pub async fn start(&self, room: &RoomName, question: &str, options: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let ordered: Vec<String> = options
            .iter()
            .filter(|option| seen.insert(option.as_str()))
            .cloned()
            .collect();

        let tally = Tally(ordered.iter().map(|option| (option.clone(), 0)).collect());
        self.votes.write().await.insert(
            room.clone(),
            Vote { question: question.to_string(), tally, voters: HashSet::new() },
        );
        ordered
    }

    /// Count one ballot. Returns the updated tally only when the ballot was
    /// accepted: an open poll, a listed option and a first-time voter.
    pub async fn cast(&self, room: &RoomName, voter: &str, option: &str) -> Option<Tally> {
        let mut votes = self.votes.write().await;
        let vote = votes.get_mut(room.as_str())?;

        if vote.voters.contains(voter) {
            return None;
        }
        let count = vote
            .tally
            .0
            .iter_mut()
            .find(|(name, _)| name == option)
            .map(|(_, count)| count)?;

        *count += 1;
        vote.voters.insert(voter.to_string());
        Some(vote.tally.clone())
    }

    pub async fn snapshot(&self, room: &RoomName) -> Option<(String, Tally)> {
        self.votes
            .read()
            .await
            .get(room.as_str())
            .map(|v| (v.question.clone(), v.tally.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_one_ballot_per_voter() {
        let votes = VoteBook::new();
        let room = RoomName::new("lobby");
        votes.start(&room, "Lunch?", &options(&["Yes", "No"])).await;

        let tally = votes.cast(&room, "UserB", "Yes").await.unwrap();
        assert_eq!(tally.get("Yes"), Some(1));
        assert_eq!(tally.get("No"), Some(0));

        assert!(votes.cast(&room, "UserB", "No").await.is_none());
        assert!(votes.cast(&room, "UserB", "Yes").await.is_none());
        let (_, tally) = votes.snapshot(&room).await.unwrap();
        assert_eq!(tally.total(), 1);
    }

    #[tokio::test]
    async fn test_unknown_option_is_ignored_and_voter_may_retry() {
        let votes = VoteBook::new();
        let room = RoomName::new("lobby");
        votes.start(&room, "Lunch?", &options(&["Yes", "No"])).await;

        assert!(votes.cast(&room, "UserC", "Maybe").await.is_none());
        assert!(votes.cast(&room, "UserC", "No").await.is_some());
    }

    #[tokio::test]
    async fn test_new_poll_resets_ballots_and_dedupes_options() {
        let votes = VoteBook::new();
        let room = RoomName::new("lobby");
        votes.start(&room, "First?", &options(&["A", "B"])).await;
        votes.cast(&room, "amy", "A").await.unwrap();

        let ordered = votes.start(&room, "Second?", &options(&["B", "A", "B"])).await;
        assert_eq!(ordered, options(&["B", "A"]));

        let tally = votes.cast(&room, "amy", "A").await.unwrap();
        assert_eq!(tally.0, vec![("B".to_string(), 0), ("A".to_string(), 1)]);
    }
}
