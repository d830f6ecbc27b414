mod common;

use common::{TestResult, TestSetup};
use ride_hailing_backend::entities::user::UserRole;
use ride_hailing_backend::services::fare::TimeBand;
use ride_hailing_backend::services::rating::RatingService;
use ride_hailing_backend::AppError;

#[tokio::test]
async fn rider_and_driver_rate_each_other() -> TestResult {
    let test = TestSetup::new().await;
    let (rider, driver, ride) = test.completed_ride().await;
    let ratings = RatingService::new(&test.db);

    let by_rider = ratings
        .rate_ride(ride.id, rider.id, 5, Some("Smooth trip".to_string()))
        .await?;
    assert_eq!(by_rider.ratee_id, driver.id);
    assert_eq!(by_rider.score, 5);

    let by_driver = ratings.rate_ride(ride.id, driver.id, 4, None).await?;
    assert_eq!(by_driver.ratee_id, rider.id);

    let for_driver = ratings.ratings_for(driver.id).await?;
    assert_eq!(for_driver.len(), 1);
    assert_eq!(for_driver[0].comment.as_deref(), Some("Smooth trip"));

    Ok(())
}

/// Expected: Conflict on the second rating by the same participant
#[tokio::test]
async fn one_rating_per_participant() -> TestResult {
    let test = TestSetup::new().await;
    let (rider, _, ride) = test.completed_ride().await;
    let ratings = RatingService::new(&test.db);

    ratings.rate_ride(ride.id, rider.id, 3, None).await?;
    let again = ratings.rate_ride(ride.id, rider.id, 1, None).await;

    assert!(matches!(again, Err(AppError::Conflict(_))));

    Ok(())
}

#[tokio::test]
async fn score_must_be_between_one_and_five() -> TestResult {
    let test = TestSetup::new().await;
    let (rider, _, ride) = test.completed_ride().await;
    let ratings = RatingService::new(&test.db);

    for score in [0, 6, -1] {
        let result = ratings.rate_ride(ride.id, rider.id, score, None).await;
        assert!(matches!(result, Err(AppError::Validation(_))), "score {}", score);
    }

    Ok(())
}

/// Expected: only completed rides can be rated
#[tokio::test]
async fn unfinished_ride_cannot_be_rated() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (_, vehicle) = test.insert_driver_with_vehicle().await;
    let booking = test.book(rider.id, vehicle.id, TimeBand::Normal).await;

    let result = RatingService::new(&test.db)
        .rate_ride(booking.ride.id, rider.id, 5, None)
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));

    Ok(())
}

#[tokio::test]
async fn outsiders_cannot_rate() -> TestResult {
    let test = TestSetup::new().await;
    let (_, _, ride) = test.completed_ride().await;
    let outsider = test.insert_user(UserRole::Rider).await;

    let result = RatingService::new(&test.db)
        .rate_ride(ride.id, outsider.id, 5, None)
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));

    Ok(())
}
