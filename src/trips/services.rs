use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::dto::{CreateTripRequest, TripDetails, TripWindow};
use super::repo;
use super::repo_types::{NewTrip, Participant, Trip};
use crate::access::{dedup_ids, ensure_participants_in_scope, Identity};
use crate::error::{AppError, AppResult};
use crate::journeys::{connections_or_empty, JourneyQuery};
use crate::state::AppState;
use crate::{roles, users};

pub(crate) fn validate_schedule(
    destination: &str,
    start_at: OffsetDateTime,
    end_at: OffsetDateTime,
) -> AppResult<()> {
    if destination.trim().is_empty() {
        return Err(AppError::validation("Destination must not be empty"));
    }
    if start_at > end_at {
        return Err(AppError::validation("Trip must not end before it starts"));
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Deduplicates `requested` and checks every id against the requester's scope.
async fn scoped_participants(
    tx: &mut Transaction<'_, Postgres>,
    requester: &Identity,
    requested: &[Uuid],
) -> AppResult<Vec<Uuid>> {
    let ids = dedup_ids(requested);
    if ids.is_empty() {
        return Ok(ids);
    }
    let found = users::repo::scoped_by_ids(&mut **tx, &ids).await?;
    ensure_participants_in_scope(requester, &ids, &found)?;
    Ok(ids)
}

async fn trip_for_admin(
    tx: &mut Transaction<'_, Postgres>,
    requester: &Identity,
    trip_id: Uuid,
) -> AppResult<Trip> {
    let trip = repo::find_for_update(&mut **tx, trip_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Trip {trip_id}")))?;
    requester.ensure_can_administer_trip(trip.created_by)?;
    Ok(trip)
}

pub async fn create_trip(db: &PgPool, requester: &Identity, req: CreateTripRequest) -> AppResult<Uuid> {
    validate_schedule(&req.destination, req.start_at, req.end_at)?;

    let mut tx = db.begin().await?;

    if roles::repo::manageable_roles(&mut *tx, requester.rank).await?.is_empty() {
        return Err(AppError::forbidden("your role cannot plan trips"));
    }
    let participants = scoped_participants(&mut tx, requester, &req.participants).await?;

    let trip = repo::insert(
        &mut *tx,
        NewTrip {
            id: Uuid::new_v4(),
            destination: req.destination.trim(),
            departure_city: non_blank(req.departure_city.as_deref()),
            arrival_city: non_blank(req.arrival_city.as_deref()),
            start_at: req.start_at,
            end_at: req.end_at,
            occasion: non_blank(req.occasion.as_deref()),
            journey_token: non_blank(req.journey_token.as_deref()),
            created_by: requester.id,
        },
    )
    .await?;
    repo::add_participants(&mut *tx, trip.id, &participants).await?;
    tx.commit().await?;

    info!(
        trip_id = %trip.id,
        destination = %trip.destination,
        participants = participants.len(),
        created_by = %requester.id,
        "trip created"
    );
    Ok(trip.id)
}

pub async fn delete_trip(db: &PgPool, requester: &Identity, trip_id: Uuid) -> AppResult<()> {
    let mut tx = db.begin().await?;
    trip_for_admin(&mut tx, requester, trip_id).await?;
    if repo::delete(&mut *tx, trip_id).await? == 0 {
        return Err(AppError::not_found(format!("Trip {trip_id}")));
    }
    tx.commit().await?;
    info!(%trip_id, deleted_by = %requester.id, "trip deleted");
    Ok(())
}

pub async fn update_occasion(
    db: &PgPool,
    requester: &Identity,
    trip_id: Uuid,
    occasion: Option<&str>,
) -> AppResult<()> {
    let mut tx = db.begin().await?;
    trip_for_admin(&mut tx, requester, trip_id).await?;
    repo::update_occasion(&mut *tx, trip_id, non_blank(occasion)).await?;
    tx.commit().await?;
    info!(%trip_id, updated_by = %requester.id, "trip occasion updated");
    Ok(())
}

/// Full replace: all assignments are dropped and the new set inserted, atomically.
pub async fn replace_participants(
    db: &PgPool,
    requester: &Identity,
    trip_id: Uuid,
    participants: &[Uuid],
) -> AppResult<()> {
    let mut tx = db.begin().await?;
    trip_for_admin(&mut tx, requester, trip_id).await?;
    let ids = scoped_participants(&mut tx, requester, participants).await?;
    let removed = repo::clear_participants(&mut *tx, trip_id).await?;
    let added = repo::add_participants(&mut *tx, trip_id, &ids).await?;
    tx.commit().await?;
    info!(%trip_id, removed, added, "trip participants replaced");
    Ok(())
}

pub async fn list_trips(db: &PgPool) -> AppResult<Vec<Trip>> {
    repo::list_all(db).await
}

pub async fn trips_created_by(db: &PgPool, manager: Uuid) -> AppResult<Vec<Trip>> {
    repo::list_created_by(db, manager).await
}

/// Global scope sees every trip; everyone else what they created or attend.
pub async fn visible_trips(db: &PgPool, identity: &Identity) -> AppResult<Vec<Trip>> {
    if identity.is_global() {
        list_trips(db).await
    } else {
        repo::list_visible(db, identity.id).await
    }
}

pub async fn trips_for_user(db: &PgPool, user_id: Uuid, window: &TripWindow) -> AppResult<Vec<Trip>> {
    if let (Some(from), Some(to)) = (window.from, window.to) {
        if from > to {
            return Err(AppError::validation("`from` must not be after `to`"));
        }
    }
    repo::list_for_user(db, user_id, window.from, window.to).await
}

pub async fn participants_of(db: &PgPool, trip_id: Uuid) -> AppResult<Vec<Participant>> {
    repo::participants_of(db, trip_id).await
}

/// Loads a trip the identity may read: participant, creator or global scope.
pub async fn visible_trip(db: &PgPool, identity: &Identity, trip_id: Uuid) -> AppResult<Trip> {
    let trip = repo::find(db, trip_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Trip {trip_id}")))?;
    if identity.can_administer_trip(trip.created_by)
        || repo::is_participant(db, trip_id, identity.id).await?
    {
        Ok(trip)
    } else {
        Err(AppError::forbidden("you are not part of this trip"))
    }
}

pub async fn trip_details(state: &AppState, identity: &Identity, trip_id: Uuid) -> AppResult<TripDetails> {
    let trip = visible_trip(&state.db, identity, trip_id).await?;
    let participants = participants_of(&state.db, trip_id).await?;
    let query = JourneyQuery::for_trip(&trip);
    let connections = connections_or_empty(state.journeys.as_ref(), query.as_ref()).await;
    Ok(TripDetails {
        trip,
        participants,
        connections,
    })
}


#[cfg(test)]
pub(crate) mod db_tests {
    use super::*;
    use crate::test_support::test_db;
    use crate::users::services::db_tests::{child, root};
    use time::macros::datetime;

    pub(crate) fn zurich(participants: Vec<Uuid>) -> CreateTripRequest {
        CreateTripRequest {
            destination: "Zurich".into(),
            departure_city: Some("Bern".into()),
            arrival_city: None,
            start_at: datetime!(2025-03-10 08:00 UTC),
            end_at: datetime!(2025-03-12 18:00 UTC),
            occasion: Some("Kickoff".into()),
            journey_token: None,
            participants,
        }
    }

    async fn participant_ids(db: &PgPool, trip: Uuid) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = participants_of(db, trip)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn zurich_scenario() {
        let Some(db) = test_db().await else { return };
        let alice = root(&db, "alice", "Manager").await;
        let bob = child(&db, &alice, "bob", "User").await;

        let trip = create_trip(&db, &alice, zurich(vec![bob.id])).await.unwrap();
        let bobs: Vec<String> = trips_for_user(&db, bob.id, &TripWindow::default())
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.destination)
            .collect();
        assert_eq!(bobs, vec!["Zurich"]);

        replace_participants(&db, &alice, trip, &[]).await.unwrap();
        assert!(trips_for_user(&db, bob.id, &TripWindow::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn manager_joins_own_trip() {
        let Some(db) = test_db().await else { return };
        let alice = root(&db, "alice", "Manager").await;
        let bob = child(&db, &alice, "bob", "User").await;

        let trip = create_trip(&db, &alice, zurich(vec![alice.id])).await.unwrap();
        assert_eq!(participant_ids(&db, trip).await, vec![alice.id]);
        assert_eq!(
            trips_for_user(&db, alice.id, &TripWindow::default()).await.unwrap().len(),
            1
        );

        replace_participants(&db, &alice, trip, &[bob.id, alice.id]).await.unwrap();
        let mut expected = vec![alice.id, bob.id];
        expected.sort();
        assert_eq!(participant_ids(&db, trip).await, expected);
    }

    #[tokio::test]
    async fn duplicate_participants_collapse() {
        let Some(db) = test_db().await else { return };
        let alice = root(&db, "alice", "Manager").await;
        let bob = child(&db, &alice, "bob", "User").await;
        let carl = child(&db, &alice, "carl", "User").await;
        let dora = child(&db, &alice, "dora", "User").await;

        let trip = create_trip(&db, &alice, zurich(vec![bob.id, bob.id, carl.id]))
            .await
            .unwrap();
        let mut expected = vec![bob.id, carl.id];
        expected.sort();
        assert_eq!(participant_ids(&db, trip).await, expected);

        replace_participants(&db, &alice, trip, &[carl.id, dora.id, dora.id])
            .await
            .unwrap();
        let mut expected = vec![carl.id, dora.id];
        expected.sort();
        assert_eq!(participant_ids(&db, trip).await, expected);
    }

    #[tokio::test]
    async fn foreign_participants_are_rejected_without_partial_writes() {
        let Some(db) = test_db().await else { return };
        let alice = root(&db, "alice", "Manager").await;
        let mallory = root(&db, "mallory", "Manager").await;
        let bob = child(&db, &alice, "bob", "User").await;
        let eve = child(&db, &mallory, "eve", "User").await;

        let err = create_trip(&db, &alice, zurich(vec![bob.id, eve.id]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(list_trips(&db).await.unwrap().is_empty());

        let trip = create_trip(&db, &alice, zurich(vec![bob.id])).await.unwrap();
        let err = replace_participants(&db, &alice, trip, &[eve.id]).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(participant_ids(&db, trip).await, vec![bob.id]);

        let err = delete_trip(&db, &mallory, trip).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn deletes_cascade_to_assignments() {
        let Some(db) = test_db().await else { return };
        let alice = root(&db, "alice", "Manager").await;
        let bob = child(&db, &alice, "bob", "User").await;
        let carl = child(&db, &alice, "carl", "User").await;

        let first = create_trip(&db, &alice, zurich(vec![bob.id, carl.id])).await.unwrap();
        let second = create_trip(&db, &alice, zurich(vec![bob.id])).await.unwrap();

        delete_trip(&db, &alice, first).await.unwrap();
        assert!(participant_ids(&db, first).await.is_empty());
        let remaining: Vec<Uuid> = list_trips(&db).await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(remaining, vec![second]);

        users::services::delete_user(&db, &alice, "bob").await.unwrap();
        assert!(participant_ids(&db, second).await.is_empty());

        let err = delete_trip(&db, &alice, first).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn plain_user_cannot_plan_or_see_foreign_trips() {
        let Some(db) = test_db().await else { return };
        let alice = root(&db, "alice", "Manager").await;
        let bob = child(&db, &alice, "bob", "User").await;
        let carl = child(&db, &alice, "carl", "User").await;

        let err = create_trip(&db, &bob, zurich(vec![])).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let trip = create_trip(&db, &alice, zurich(vec![bob.id])).await.unwrap();
        assert!(visible_trip(&db, &bob, trip).await.is_ok());
        assert!(matches!(
            visible_trip(&db, &carl, trip).await,
            Err(AppError::Forbidden(_))
        ));

        update_occasion(&db, &alice, trip, Some("Offsite")).await.unwrap();
        let stored = repo::find(&db, trip).await.unwrap().unwrap();
        assert_eq!(stored.occasion.as_deref(), Some("Offsite"));
    }

    #[tokio::test]
    async fn trips_are_ordered_and_windowed() {
        let Some(db) = test_db().await else { return };
        let alice = root(&db, "alice", "Manager").await;
        let bob = child(&db, &alice, "bob", "User").await;

        let mut later = zurich(vec![bob.id]);
        later.destination = "Geneva".into();
        later.start_at = datetime!(2025-06-01 08:00 UTC);
        later.end_at = datetime!(2025-06-02 08:00 UTC);
        create_trip(&db, &alice, later).await.unwrap();
        create_trip(&db, &alice, zurich(vec![bob.id])).await.unwrap();

        let all: Vec<String> = trips_for_user(&db, bob.id, &TripWindow::default())
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.destination)
            .collect();
        assert_eq!(all, vec!["Zurich", "Geneva"]);

        let window = TripWindow {
            from: Some(datetime!(2025-05-31 00:00 UTC)),
            to: Some(datetime!(2025-06-30 00:00 UTC)),
        };
        let june: Vec<String> = trips_for_user(&db, bob.id, &window)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.destination)
            .collect();
        assert_eq!(june, vec!["Geneva"]);
        assert_eq!(trips_created_by(&db, alice.id).await.unwrap().len(), 2);
    }
}
