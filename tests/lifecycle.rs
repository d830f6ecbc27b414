//! Driver assignment, trip progress, cancellation and timeouts against a real database.

mod common;

use chrono::{Duration, Utc};
use common::{TestResult, TestSetup};
use ride_hailing_backend::entities::ride::RideStatus;
use ride_hailing_backend::entities::ride_cancel::{self, CancelledBy};
use ride_hailing_backend::entities::ride_request::{self, RideRequestStatus};
use ride_hailing_backend::entities::user::UserRole;
use ride_hailing_backend::services::fare::TimeBand;
use ride_hailing_backend::services::lifecycle::CancelOutcome;
use ride_hailing_backend::AppError;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter, Set};
use uuid::Uuid;

#[tokio::test]
async fn accept_assigns_driver_and_reserves_vehicle() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (driver, vehicle) = test.insert_driver_with_vehicle().await;
    let booking = test.book(rider.id, vehicle.id, TimeBand::Normal).await;

    let request = test
        .bookings()
        .accept_request(booking.request.id, driver.id, vehicle.id)
        .await?;

    assert_eq!(request.status, RideRequestStatus::Assigned);
    assert_eq!(request.assigned_driver_id, Some(driver.id));
    assert_eq!(request.assigned_vehicle_id, Some(vehicle.id));
    assert!(!test.vehicle(vehicle.id).await.available);

    // The ride only learns its driver when the trip starts
    assert_eq!(test.ride(booking.ride.id).await.driver_id, None);

    Ok(())
}

/// Expected: the second driver loses at the conditional update with Conflict,
/// the first assignment stands and the loser's vehicle is untouched
#[tokio::test]
async fn second_accept_conflicts() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (first, first_vehicle) = test.insert_driver_with_vehicle().await;
    let (second, second_vehicle) = test.insert_driver_with_vehicle().await;
    let booking = test.book(rider.id, first_vehicle.id, TimeBand::Normal).await;

    let service = test.bookings();
    service
        .accept_request(booking.request.id, first.id, first_vehicle.id)
        .await?;

    let result = service
        .accept_request(booking.request.id, second.id, second_vehicle.id)
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(
        test.request(booking.request.id).await.assigned_driver_id,
        Some(first.id)
    );
    assert!(test.vehicle(second_vehicle.id).await.available);

    Ok(())
}

/// Expected: Conflict from the reservation; the claimed request is rolled back
#[tokio::test]
async fn unavailable_vehicle_rolls_back_claim() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (driver, vehicle) = test.insert_driver_with_vehicle().await;
    let booking = test.book(rider.id, vehicle.id, TimeBand::Normal).await;

    let mut parked = test.vehicle(vehicle.id).await.into_active_model();
    parked.available = Set(false);
    parked.update(&test.db).await?;

    let result = test
        .bookings()
        .accept_request(booking.request.id, driver.id, vehicle.id)
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));

    let untouched = test.request(booking.request.id).await;
    assert_eq!(untouched.status, RideRequestStatus::Waiting);
    assert_eq!(untouched.assigned_driver_id, None);
    assert_eq!(untouched.assigned_vehicle_id, None);
    assert!(!test.vehicle(vehicle.id).await.available);

    Ok(())
}

/// Expected: a driver with a second free vehicle still cannot take a second request
#[tokio::test]
async fn driver_holds_one_request_at_a_time() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (driver, car) = test.insert_driver_with_vehicle().await;
    let van = test.insert_vehicle(driver.id, 12.0).await;
    let first = test.book(rider.id, car.id, TimeBand::Normal).await;
    let second = test.book(rider.id, van.id, TimeBand::Normal).await;

    let service = test.bookings();
    service
        .accept_request(first.request.id, driver.id, car.id)
        .await?;

    let result = service
        .accept_request(second.request.id, driver.id, van.id)
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(
        test.request(second.request.id).await.status,
        RideRequestStatus::Waiting
    );
    assert!(test.vehicle(van.id).await.available);

    // Still busy while the first trip is under way
    service.start_ride(first.request.id, driver.id).await?;
    let result = service
        .accept_request(second.request.id, driver.id, van.id)
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    // Free again once it is done
    service.complete_ride(first.request.id, driver.id).await?;
    let accepted = service
        .accept_request(second.request.id, driver.id, van.id)
        .await?;
    assert_eq!(accepted.status, RideRequestStatus::Assigned);

    Ok(())
}

/// Expected: a request cancelled after assignment is closed, not contended
#[tokio::test]
async fn cancelled_request_cannot_be_accepted() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (driver, vehicle) = test.insert_driver_with_vehicle().await;
    let booking = test.book(rider.id, vehicle.id, TimeBand::Normal).await;

    let service = test.bookings();
    service
        .accept_request(booking.request.id, driver.id, vehicle.id)
        .await?;
    service
        .cancel_ride(booking.ride.id, CancelledBy::Rider, Some(rider.id), "Found a lift")
        .await?;

    let result = service
        .accept_request(booking.request.id, driver.id, vehicle.id)
        .await;

    assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    assert!(test.vehicle(vehicle.id).await.available);

    Ok(())
}

#[tokio::test]
async fn cannot_accept_with_someone_elses_vehicle() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (_, vehicle) = test.insert_driver_with_vehicle().await;
    let other_driver = test.insert_user(UserRole::Driver).await;
    let booking = test.book(rider.id, vehicle.id, TimeBand::Normal).await;

    let result = test
        .bookings()
        .accept_request(booking.request.id, other_driver.id, vehicle.id)
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert_eq!(
        test.request(booking.request.id).await.status,
        RideRequestStatus::Waiting
    );

    Ok(())
}

/// Expected: request back in the queue with no driver, vehicle free again
#[tokio::test]
async fn release_returns_request_to_queue() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (driver, vehicle) = test.insert_driver_with_vehicle().await;
    let booking = test.book(rider.id, vehicle.id, TimeBand::Normal).await;

    let service = test.bookings();
    service
        .accept_request(booking.request.id, driver.id, vehicle.id)
        .await?;
    let request = service.release_request(booking.request.id, driver.id).await?;

    assert_eq!(request.status, RideRequestStatus::Waiting);
    assert_eq!(request.assigned_driver_id, None);
    assert_eq!(request.assigned_vehicle_id, None);
    assert!(test.vehicle(vehicle.id).await.available);

    let open = service.open_requests().await?;
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, booking.request.id);

    Ok(())
}

#[tokio::test]
async fn only_assigned_driver_can_release() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (driver, vehicle) = test.insert_driver_with_vehicle().await;
    let stranger = test.insert_user(UserRole::Driver).await;
    let booking = test.book(rider.id, vehicle.id, TimeBand::Normal).await;

    let service = test.bookings();
    service
        .accept_request(booking.request.id, driver.id, vehicle.id)
        .await?;

    let result = service.release_request(booking.request.id, stranger.id).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    Ok(())
}

/// Expected: ride completed with this driver, end after start, vehicle free
#[tokio::test]
async fn full_trip_completes_ride_and_request() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (driver, vehicle) = test.insert_driver_with_vehicle().await;
    let booking = test.book(rider.id, vehicle.id, TimeBand::Normal).await;

    let service = test.bookings();
    service
        .accept_request(booking.request.id, driver.id, vehicle.id)
        .await?;

    let started = service.start_ride(booking.request.id, driver.id).await?;
    assert_eq!(started.status, RideStatus::InProgress);
    assert_eq!(started.driver_id, Some(driver.id));
    assert_eq!(
        test.request(booking.request.id).await.status,
        RideRequestStatus::InProgress
    );

    let completed = service.complete_ride(booking.request.id, driver.id).await?;
    assert_eq!(completed.status, RideStatus::Completed);
    assert_eq!(completed.driver_id, Some(driver.id));
    let end_time = completed.end_time.expect("end time recorded");
    assert!(end_time >= completed.start_time);
    assert_eq!(completed.fare, 83.73);

    assert_eq!(
        test.request(booking.request.id).await.status,
        RideRequestStatus::Completed
    );
    assert!(test.vehicle(vehicle.id).await.available);

    Ok(())
}

/// Expected: a late pickup moves the placeholder end time along with the start
#[tokio::test]
async fn late_start_keeps_end_after_start() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (driver, vehicle) = test.insert_driver_with_vehicle().await;

    let mut request = common::booking_request(rider.id, vehicle.id, TimeBand::Normal);
    request.scheduled_time = Utc::now() - Duration::minutes(45);
    let booking = test.bookings().create_booking(request).await?;

    let service = test.bookings();
    service
        .accept_request(booking.request.id, driver.id, vehicle.id)
        .await?;
    let started = service.start_ride(booking.request.id, driver.id).await?;

    assert_eq!(started.status, RideStatus::InProgress);
    assert!(started.start_time > booking.ride.start_time);
    let end_time = started.end_time.expect("placeholder end time");
    assert!(end_time >= started.start_time);
    assert_eq!(end_time, started.start_time + Duration::minutes(30));

    Ok(())
}

/// Expected: InvalidTransition, nothing changes
#[tokio::test]
async fn cannot_complete_before_start() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (driver, vehicle) = test.insert_driver_with_vehicle().await;
    let booking = test.book(rider.id, vehicle.id, TimeBand::Normal).await;

    let service = test.bookings();
    service
        .accept_request(booking.request.id, driver.id, vehicle.id)
        .await?;

    let result = service.complete_ride(booking.request.id, driver.id).await;

    assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    assert_eq!(test.ride(booking.ride.id).await.status, RideStatus::Requested);

    Ok(())
}

/// Expected: second cancel reports AlreadyCancelled and adds no record
#[tokio::test]
async fn cancel_twice_keeps_single_record() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (driver, vehicle) = test.insert_driver_with_vehicle().await;
    let booking = test.book(rider.id, vehicle.id, TimeBand::Normal).await;

    let service = test.bookings();
    service
        .accept_request(booking.request.id, driver.id, vehicle.id)
        .await?;

    let (ride, outcome) = service
        .cancel_ride(booking.ride.id, CancelledBy::Rider, Some(rider.id), "Changed plans")
        .await?;
    assert_eq!(outcome, CancelOutcome::Cancelled);
    assert_eq!(ride.status, RideStatus::Cancelled);

    let (ride, outcome) = service
        .cancel_ride(booking.ride.id, CancelledBy::Rider, Some(rider.id), "Again")
        .await?;
    assert_eq!(outcome, CancelOutcome::AlreadyCancelled);
    assert_eq!(ride.status, RideStatus::Cancelled);

    let records = ride_cancel::Entity::find()
        .filter(ride_cancel::Column::RideId.eq(booking.ride.id))
        .all(&test.db)
        .await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason, "Changed plans");
    assert_eq!(records[0].cancelled_by, CancelledBy::Rider);

    assert_eq!(
        test.request(booking.request.id).await.status,
        RideRequestStatus::Cancelled
    );
    assert!(test.vehicle(vehicle.id).await.available);

    Ok(())
}

/// Expected: an in-progress trip can be cancelled by its driver
#[tokio::test]
async fn driver_cancels_trip_in_progress() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (driver, vehicle) = test.insert_driver_with_vehicle().await;
    let booking = test.book(rider.id, vehicle.id, TimeBand::Normal).await;

    let service = test.bookings();
    service
        .accept_request(booking.request.id, driver.id, vehicle.id)
        .await?;
    service.start_ride(booking.request.id, driver.id).await?;

    let (ride, outcome) = service
        .cancel_ride(booking.ride.id, CancelledBy::Driver, Some(driver.id), "Flat tyre")
        .await?;

    assert_eq!(outcome, CancelOutcome::Cancelled);
    assert_eq!(ride.status, RideStatus::Cancelled);
    assert_eq!(
        test.request(booking.request.id).await.status,
        RideRequestStatus::Cancelled
    );
    assert!(test.vehicle(vehicle.id).await.available);

    Ok(())
}

#[tokio::test]
async fn completed_ride_cannot_be_cancelled() -> TestResult {
    let test = TestSetup::new().await;
    let (rider, _, ride) = test.completed_ride().await;

    let result = test
        .bookings()
        .cancel_ride(ride.id, CancelledBy::Rider, Some(rider.id), "Too late")
        .await;

    assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    assert_eq!(ride_cancel::Entity::find().count(&test.db).await?, 0);

    Ok(())
}

#[tokio::test]
async fn other_rider_cannot_cancel() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let stranger = test.insert_user(UserRole::Rider).await;
    let (_, vehicle) = test.insert_driver_with_vehicle().await;
    let booking = test.book(rider.id, vehicle.id, TimeBand::Normal).await;

    let result = test
        .bookings()
        .cancel_ride(booking.ride.id, CancelledBy::Rider, Some(stranger.id), "Not mine")
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert_eq!(test.ride(booking.ride.id).await.status, RideStatus::Requested);

    Ok(())
}

/// Expected: request times out, ride cancelled by the system, no later acceptance
#[tokio::test]
async fn timeout_closes_request_and_ride() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (driver, vehicle) = test.insert_driver_with_vehicle().await;
    let booking = test.book(rider.id, vehicle.id, TimeBand::Normal).await;

    let service = test.bookings();
    let request = service.timeout_request(booking.request.id).await?;
    assert_eq!(request.status, RideRequestStatus::Timeout);

    assert_eq!(test.ride(booking.ride.id).await.status, RideStatus::Cancelled);
    let record = ride_cancel::Entity::find()
        .filter(ride_cancel::Column::RideId.eq(booking.ride.id))
        .one(&test.db)
        .await?
        .expect("system cancel recorded");
    assert_eq!(record.cancelled_by, CancelledBy::System);
    assert_eq!(record.user_id, None);

    let result = service
        .accept_request(booking.request.id, driver.id, vehicle.id)
        .await;
    assert!(matches!(result, Err(AppError::InvalidTransition(_))));

    Ok(())
}

/// Expected: only the request older than the window times out
#[tokio::test]
async fn expire_stale_requests_uses_window() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (_, vehicle) = test.insert_driver_with_vehicle().await;
    let stale = test.book(rider.id, vehicle.id, TimeBand::Normal).await;
    let fresh = test.book(rider.id, vehicle.id, TimeBand::Normal).await;

    test.age(&stale, Duration::minutes(30)).await;

    let expired = test
        .bookings()
        .expire_stale_requests(Utc::now(), Duration::minutes(10))
        .await?;

    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, stale.request.id);
    assert_eq!(
        test.request(fresh.request.id).await.status,
        RideRequestStatus::Waiting
    );

    let waiting = ride_request::Entity::find()
        .filter(ride_request::Column::Status.eq(RideRequestStatus::Waiting))
        .count(&test.db)
        .await?;
    assert_eq!(waiting, 1);

    Ok(())
}

/// Expected: the window runs from the pickup time, so future bookings survive the sweep
#[tokio::test]
async fn expiry_waits_for_scheduled_pickup() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (_, vehicle) = test.insert_driver_with_vehicle().await;

    let pickup = Utc::now() + Duration::hours(3);
    let mut request = common::booking_request(rider.id, vehicle.id, TimeBand::Normal);
    request.scheduled_time = pickup;
    let booking = test.bookings().create_booking(request).await?;
    assert_eq!(booking.ride.status, RideStatus::Scheduled);

    let service = test.bookings();
    let expired = service
        .expire_stale_requests(Utc::now() + Duration::minutes(11), Duration::minutes(10))
        .await?;
    assert!(expired.is_empty());
    assert_eq!(test.ride(booking.ride.id).await.status, RideStatus::Scheduled);

    let expired = service
        .expire_stale_requests(pickup + Duration::minutes(11), Duration::minutes(10))
        .await?;
    assert_eq!(expired.len(), 1);
    assert_eq!(test.ride(booking.ride.id).await.status, RideStatus::Cancelled);

    Ok(())
}

/// Expected: a cancel recorded first makes the timeout a Conflict, and the sweep moves on
#[tokio::test]
async fn timeout_after_cancel_record_is_skipped() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (_, vehicle) = test.insert_driver_with_vehicle().await;
    let raced = test.book(rider.id, vehicle.id, TimeBand::Normal).await;
    let stale = test.book(rider.id, vehicle.id, TimeBand::Normal).await;
    test.age(&raced, Duration::minutes(30)).await;
    test.age(&stale, Duration::minutes(30)).await;

    // Cancel row written, ride and request not yet updated
    ride_cancel::ActiveModel {
        id: Set(Uuid::new_v4()),
        ride_id: Set(raced.ride.id),
        user_id: Set(Some(rider.id)),
        cancelled_by: Set(CancelledBy::Rider),
        reason: Set("Changed plans".to_string()),
        cancelled_at: Set(Utc::now().fixed_offset()),
    }
    .insert(&test.db)
    .await?;

    let service = test.bookings();
    let result = service.timeout_request(raced.request.id).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(
        test.request(raced.request.id).await.status,
        RideRequestStatus::Waiting
    );

    let expired = service
        .expire_stale_requests(Utc::now(), Duration::minutes(10))
        .await?;
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, stale.request.id);

    Ok(())
}

#[tokio::test]
async fn schedule_requires_future_start() -> TestResult {
    let test = TestSetup::new().await;
    let rider = test.insert_user(UserRole::Rider).await;
    let (_, vehicle) = test.insert_driver_with_vehicle().await;
    let booking = test.book(rider.id, vehicle.id, TimeBand::Normal).await;

    let service = test.bookings();

    let past = service
        .schedule_ride(booking.ride.id, rider.id, Utc::now() - Duration::hours(1))
        .await;
    assert!(matches!(past, Err(AppError::InvalidTransition(_))));

    let start = Utc::now() + Duration::hours(2);
    let ride = service.schedule_ride(booking.ride.id, rider.id, start).await?;
    assert_eq!(ride.status, RideStatus::Scheduled);
    assert_eq!(ride.end_time, Some(ride.start_time + Duration::minutes(30)));

    // Already scheduled
    let again = service
        .schedule_ride(booking.ride.id, rider.id, start + Duration::hours(1))
        .await;
    assert!(matches!(again, Err(AppError::InvalidTransition(_))));

    Ok(())
}
