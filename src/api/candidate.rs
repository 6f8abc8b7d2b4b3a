use mongodb::{
    bson::{doc, Document},
    options::{FindOneAndUpdateOptions, ReturnDocument},
    Client,
};
use rocket::{
    futures::TryStreamExt, http::Status, response::status::Created, serde::json::Json, tokio,
    Route, State,
};
use validator::Validate;

use crate::{
    cache::{user_key, Cache, CANDIDATES_KEY, VOTE_COUNT_KEY},
    error::{Error, Result},
    model::{
        api::{ApiResponse, CandidateRequest, CandidateUpdateRequest},
        auth::{AdminSession, Session},
        candidate::{
            tally, vote_update, Candidate, CandidateView, NewCandidate, TallyEntry, VoteRecord,
        },
        mongodb::{Coll, Id},
        user::User,
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        create_candidate,
        update_candidate,
        delete_candidate,
        vote,
        vote_count,
        get_candidates,
    ]
}

#[post("/", data = "<request>", format = "json")]
pub async fn create_candidate(
    admin: AdminSession,
    request: Json<CandidateRequest>,
    candidates: Coll<Candidate>,
    new_candidates: Coll<NewCandidate>,
    cache: Cache,
) -> Result<Created<Json<ApiResponse<CandidateView>>>> {
    let request = request.into_inner();
    request.validate()?;

    let candidate = NewCandidate::new(&request.name, &request.party, request.age, admin.user.id);

    // (name, party) must be unique as a pair; the unique index backs this
    // up under concurrent creations.
    let existing = candidates
        .find_one(
            doc! { "name": &candidate.name, "party": &candidate.party },
            None,
        )
        .await?;
    if existing.is_some() {
        return Err(Error::Conflict("Candidate already exists.".to_string()));
    }

    let new_id: Id = new_candidates
        .insert_one(&candidate, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Valid because the ID comes directly from the database.
        .into();
    let candidate = Candidate {
        id: new_id,
        candidate,
    };
    cache.invalidate(&[CANDIDATES_KEY, VOTE_COUNT_KEY]).await;

    Ok(Created::new(format!("/candidate/{new_id}")).body(Json(ApiResponse::new(
        Status::Created,
        "Candidate created successfully.",
        CandidateView::from(&candidate),
    ))))
}

#[put("/update-candidate/<id>", data = "<patch>", format = "json")]
pub async fn update_candidate(
    _session: Session,
    id: Id,
    patch: Json<CandidateUpdateRequest>,
    candidates: Coll<Candidate>,
    cache: Cache,
) -> Result<Json<ApiResponse<CandidateView>>> {
    let patch = patch.into_inner();

    // The vote ledger is only ever touched by the vote operation.
    if let Some(field) = patch.protected_fields().first() {
        return Err(Error::Forbidden(format!("{field} cannot be updated")));
    }
    patch.validate()?;

    let mut set = Document::new();
    if let Some(name) = &patch.name {
        set.insert("name", name.to_uppercase());
    }
    if let Some(party) = &patch.party {
        set.insert("party", party.to_uppercase());
    }
    if let Some(age) = patch.age {
        set.insert("age", i32::from(age));
    }
    if set.is_empty() {
        return Err(Error::Validation("No updatable fields provided".to_string()));
    }

    let updated = candidates
        .find_one_and_update(
            id.as_doc(),
            doc! { "$set": set },
            FindOneAndUpdateOptions::builder()
                .return_document(ReturnDocument::After)
                .build(),
        )
        .await?
        .ok_or_else(|| Error::NotFound("Candidate not found".to_string()))?;
    cache.invalidate(&[CANDIDATES_KEY, VOTE_COUNT_KEY]).await;

    Ok(Json(ApiResponse::ok(
        "Candidate updated successfully",
        CandidateView::from(&updated),
    )))
}

#[delete("/delete-candidate/<id>")]
pub async fn delete_candidate(
    _admin: AdminSession,
    id: Id,
    candidates: Coll<Candidate>,
    cache: Cache,
) -> Result<Json<ApiResponse<CandidateView>>> {
    let deleted = candidates
        .find_one_and_delete(id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::NotFound("Candidate not found".to_string()))?;
    cache.invalidate(&[CANDIDATES_KEY, VOTE_COUNT_KEY]).await;

    Ok(Json(ApiResponse::ok(
        "Candidate deleted",
        CandidateView::from(&deleted),
    )))
}

#[get("/vote/<id>")]
pub async fn vote(
    session: Session,
    id: Id,
    users: Coll<User>,
    candidates: Coll<Candidate>,
    db_client: &State<Client>,
    cache: Cache,
) -> Result<Json<ApiResponse<()>>> {
    let voter_id = session.user.id;

    // Load candidate and voter concurrently. The session's copy of the
    // user may have come from the cache; the eligibility check reads the
    // database so a revoked or already-spent vote flag is never missed.
    let (candidate, voter) = tokio::join!(
        candidates.find_one(id.as_doc(), None),
        users.find_one(voter_id.as_doc(), None),
    );
    let candidate = candidate?.ok_or_else(|| Error::NotFound("Candidate not found".to_string()))?;
    let voter = voter?.ok_or_else(|| Error::NotFound("User not found".to_string()))?;
    voter.ensure_can_vote()?;

    // Flipping the voter's flag and appending to the ledger either both
    // happen or neither does. The flip is conditional on the flag still
    // being unset, so a concurrent duplicate loses the race cleanly
    // instead of double-counting.
    let vote = VoteRecord::new(voter_id);
    let mut db_session = db_client.start_session(None).await?;
    db_session.start_transaction(None).await?;

    let flipped = users
        .update_one_with_session(
            doc! { "_id": *voter_id, "role": "voter", "has_voted": false },
            doc! { "$set": { "has_voted": true } },
            None,
            &mut db_session,
        )
        .await?;
    if flipped.modified_count == 0 {
        db_session.abort_transaction().await?;
        return Err(Error::Conflict("You have already voted".to_string()));
    }

    let recorded = candidates
        .update_one_with_session(candidate.id.as_doc(), vote_update(&vote), None, &mut db_session)
        .await?;
    if recorded.matched_count == 0 {
        // The candidate was deleted between the load and the update.
        db_session.abort_transaction().await?;
        return Err(Error::NotFound("Candidate not found".to_string()));
    }

    db_session.commit_transaction().await?;

    cache
        .invalidate(&[CANDIDATES_KEY, VOTE_COUNT_KEY, &user_key(voter_id)])
        .await;

    Ok(Json(ApiResponse::message(
        Status::Ok,
        "Vote recorded successfully",
    )))
}

#[get("/vote-count")]
pub async fn vote_count(
    _session: Session,
    candidates: Coll<Candidate>,
    cache: Cache,
) -> Result<Json<ApiResponse<Vec<TallyEntry>>>> {
    if let Some(cached) = cache.get::<Vec<TallyEntry>>(VOTE_COUNT_KEY).await {
        return Ok(Json(ApiResponse::ok(
            "Vote record fetched successfully (from cache)",
            cached,
        )));
    }

    let all: Vec<Candidate> = candidates.find(None, None).await?.try_collect().await?;
    let entries = tally(&all);
    cache.put(VOTE_COUNT_KEY, &entries).await;

    Ok(Json(ApiResponse::ok(
        "Vote record fetched successfully",
        entries,
    )))
}

#[get("/")]
pub async fn get_candidates(
    _session: Session,
    candidates: Coll<Candidate>,
    cache: Cache,
) -> Result<Json<ApiResponse<Vec<CandidateView>>>> {
    if let Some(cached) = cache.get::<Vec<CandidateView>>(CANDIDATES_KEY).await {
        return Ok(Json(ApiResponse::ok(
            "Candidates list fetched successfully (from cache)",
            cached,
        )));
    }

    let all: Vec<Candidate> = candidates.find(None, None).await?.try_collect().await?;
    let views = all.iter().map(CandidateView::from).collect::<Vec<_>>();
    cache.put(CANDIDATES_KEY, &views).await;

    Ok(Json(ApiResponse::ok(
        "Candidates list fetched successfully",
        views,
    )))
}
