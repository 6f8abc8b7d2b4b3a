use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, to_bson, Document};
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// A single cast vote: who voted and when. Appended to the candidate's
/// ledger by the vote operation and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub user: Id,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub voted_at: DateTime<Utc>,
}

impl VoteRecord {
    pub fn new(user: Id) -> Self {
        Self {
            user,
            voted_at: Utc::now(),
        }
    }
}

/// Core candidate data, as stored in the database.
///
/// `vote_count` always equals `votes.len()`: both are only ever touched by
/// [`vote_update`], which appends one record and increments by one inside
/// the same update document.
#[derive(Debug, Serialize, Deserialize)]
pub struct CandidateCore {
    pub name: String,
    pub party: String,
    pub age: u8,
    pub votes: Vec<VoteRecord>,
    pub vote_count: u64,
    /// The admin who created this candidate.
    pub created_by: Id,
}

impl CandidateCore {
    /// Create a new candidate with an empty ledger. Names and parties are
    /// stored upper-cased so the (name, party) uniqueness check is
    /// case-insensitive.
    pub fn new(name: &str, party: &str, age: u8, created_by: Id) -> Self {
        Self {
            name: name.to_uppercase(),
            party: party.to_uppercase(),
            age,
            votes: Vec::new(),
            vote_count: 0,
            created_by,
        }
    }
}

/// A candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}

/// The update document recording one vote: exactly one appended ledger
/// entry and a count increment of exactly one, applied atomically to the
/// candidate document.
pub fn vote_update(vote: &VoteRecord) -> Document {
    let vote = to_bson(vote).expect("vote serialization does not fail");
    doc! {
        "$push": { "votes": vote },
        "$inc": { "vote_count": 1 },
    }
}

/// The client-facing projection of a candidate, without the vote ledger.
#[derive(Debug, Serialize, Deserialize)]
pub struct CandidateView {
    pub id: String,
    pub name: String,
    pub party: String,
    pub age: u8,
    pub vote_count: u64,
}

impl From<&Candidate> for CandidateView {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.id.to_string(),
            name: candidate.name.clone(),
            party: candidate.party.clone(),
            age: candidate.age,
            vote_count: candidate.vote_count,
        }
    }
}

/// One row of the election tally.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyEntry {
    pub party: String,
    pub vote_count: u64,
}

/// Project candidates into the tally, ordered by descending vote count.
pub fn tally(candidates: &[Candidate]) -> Vec<TallyEntry> {
    let mut entries = candidates
        .iter()
        .map(|candidate| TallyEntry {
            party: candidate.party.clone(),
            vote_count: candidate.vote_count,
        })
        .collect::<Vec<_>>();
    entries.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));
    entries
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    impl Candidate {
        pub fn example(party: &str, vote_count: u64) -> Self {
            Self {
                id: ObjectId::new().into(),
                candidate: CandidateCore {
                    vote_count,
                    ..CandidateCore::new("Morgan Reed", party, 45, ObjectId::new().into())
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{oid::ObjectId, Bson};

    #[test]
    fn new_candidates_are_normalized_and_empty() {
        let candidate = CandidateCore::new("Morgan Reed", "Unity", 45, ObjectId::new().into());
        assert_eq!("MORGAN REED", candidate.name);
        assert_eq!("UNITY", candidate.party);
        assert_eq!(0, candidate.vote_count);
        assert!(candidate.votes.is_empty());
    }

    #[test]
    fn vote_update_appends_once_and_increments_by_one() {
        let vote = VoteRecord::new(ObjectId::new().into());
        let update = vote_update(&vote);

        let push = update.get_document("$push").unwrap();
        assert!(push.contains_key("votes"));
        // A single record, not an array of them.
        assert!(!matches!(push.get("votes"), Some(Bson::Array(_))));

        let inc = update.get_document("$inc").unwrap();
        assert_eq!(Some(&Bson::Int32(1)), inc.get("vote_count"));
    }

    #[test]
    fn tally_is_ordered_by_descending_count() {
        let candidates = vec![
            Candidate::example("UNITY", 2),
            Candidate::example("PROGRESS", 7),
            Candidate::example("REFORM", 4),
        ];

        let tally = tally(&candidates);

        assert_eq!(3, tally.len());
        assert_eq!(
            vec!["PROGRESS", "REFORM", "UNITY"],
            tally.iter().map(|entry| entry.party.as_str()).collect::<Vec<_>>()
        );
        assert!(tally.windows(2).all(|w| w[0].vote_count >= w[1].vote_count));
    }

    #[test]
    fn tally_of_no_candidates_is_empty() {
        assert!(tally(&[]).is_empty());
    }
}
