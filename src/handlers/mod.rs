pub mod admin;
pub mod auth;
pub mod driver;
pub mod public;
pub mod rider;

use std::collections::HashMap;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::{location, ride, ride_request};
use crate::error::AppResult;

/// A ride with its pickup and dropoff resolved.
#[derive(Debug, Serialize)]
pub struct RideView {
    #[serde(flatten)]
    pub ride: ride::Model,
    pub pickup: Option<location::Model>,
    pub dropoff: Option<location::Model>,
}

/// A ride request with its pickup and dropoff resolved.
#[derive(Debug, Serialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: ride_request::Model,
    pub pickup: Option<location::Model>,
    pub dropoff: Option<location::Model>,
}

async fn load_locations(
    db: &DatabaseConnection,
    ids: impl IntoIterator<Item = Uuid>,
) -> AppResult<HashMap<Uuid, location::Model>> {
    let ids: Vec<Uuid> = ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    Ok(location::Entity::find()
        .filter(location::Column::Id.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|l| (l.id, l))
        .collect())
}

pub async fn ride_views(db: &DatabaseConnection, rides: Vec<ride::Model>) -> AppResult<Vec<RideView>> {
    let locations = load_locations(
        db,
        rides
            .iter()
            .flat_map(|r| [r.pickup_location_id, r.dropoff_location_id]),
    )
    .await?;

    Ok(rides
        .into_iter()
        .map(|ride| RideView {
            pickup: locations.get(&ride.pickup_location_id).cloned(),
            dropoff: locations.get(&ride.dropoff_location_id).cloned(),
            ride,
        })
        .collect())
}

pub async fn ride_view(db: &DatabaseConnection, ride: ride::Model) -> AppResult<RideView> {
    let mut views = ride_views(db, vec![ride]).await?;
    Ok(views.remove(0))
}

pub async fn request_views(
    db: &DatabaseConnection,
    requests: Vec<ride_request::Model>,
) -> AppResult<Vec<RequestView>> {
    let locations = load_locations(
        db,
        requests
            .iter()
            .flat_map(|r| [r.pickup_location_id, r.dropoff_location_id]),
    )
    .await?;

    Ok(requests
        .into_iter()
        .map(|request| RequestView {
            pickup: locations.get(&request.pickup_location_id).cloned(),
            dropoff: locations.get(&request.dropoff_location_id).cloned(),
            request,
        })
        .collect())
}
