//! JSON facade over [`TrackingEngine`].
//!
//! Requests and responses use the camelCase wire shapes devices and
//! dashboards speak.  Every response is wrapped in an [`ApiResponse`]:
//!
//! ```json
//! { "success": false,
//!   "error": { "kind": "OutOfOrderEvent", "message": "departure at stop S2 …" } }
//! ```
//!
//! Query responses also carry a `metadata` envelope with the response time
//! and the time range or window the query applied.
//!
//! [`TrackingApi::handle_json`] dispatches on the `op` field:
//!
//! ```json
//! { "op": "recordArrival", "tripId": "T1", "stopId": "S1" }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use tt_core::{
    BusId, DeviceId, ErrorKind, GeoPoint, RouteId, ScheduleId, StaffId, StopId, TimeRange,
    Timestamp, TrackError, TrackResult, TripId,
};
use tt_trip::{
    Eta, IngestOutcome, LocationSample, ManualConfirmation, ProgressCorrection, ProgressEstimate,
    ProgressVerdict, Rejection, StartTrip, StopEvent, StopEventRequest, StopEventType, StopReason,
    StopTracking, Trip, TripStatus,
};

use crate::{
    ArrivalEstimate, LocationView, NextStopView, Page, PageRequest, TrackingEngine,
    TrackingObserver, TripStatusView,
};

// ── Envelope ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApiError {
    pub kind:    ErrorKind,
    pub message: String,
}

impl From<&TrackError> for ApiError {
    fn from(e: &TrackError) -> Self {
        Self { kind: e.kind(), message: e.to_string() }
    }
}

impl From<&Rejection> for ApiError {
    fn from(r: &Rejection) -> Self {
        Self { kind: r.kind, message: r.message.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub timestamp:      Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range:     Option<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_minutes: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub success:  bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data:     Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error:    Option<ApiError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None, metadata: None }
    }

    pub fn err(error: &TrackError) -> Self {
        Self { success: false, data: None, error: Some(ApiError::from(error)), metadata: None }
    }

    pub fn from_result(result: TrackResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e)   => Self::err(&e),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

// ── Request DTOs ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointDto {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<f64>,
}

impl From<PointDto> for GeoPoint {
    fn from(p: PointDto) -> Self {
        GeoPoint::new(p.lat, p.lng)
    }
}

impl From<GeoPoint> for PointDto {
    fn from(p: GeoPoint) -> Self {
        Self { lat: p.lat, lng: p.lon, alt: None }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub trip_id:   TripId,
    pub device_id: DeviceId,
    pub bus_id:    BusId,
    pub point:     PointDto,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub speed:     Option<f64>,
    #[serde(default)]
    pub accuracy:  Option<f64>,
    #[serde(default)]
    pub heading:   Option<f64>,
    #[serde(default)]
    pub altitude:  Option<f64>,
}

impl IngestRequest {
    /// A missing timestamp is stamped with `now`.  `altitude` wins over
    /// `point.alt` when both are present.
    pub fn into_sample(self, now: Timestamp) -> LocationSample {
        let mut sample = LocationSample::new(
            self.trip_id,
            self.device_id,
            self.bus_id,
            self.point.into(),
            self.timestamp.unwrap_or(now),
        );
        sample.speed_mps   = self.speed;
        sample.accuracy_m  = self.accuracy;
        sample.heading_deg = self.heading;
        sample.altitude_m  = self.altitude.or(self.point.alt);
        sample
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestBatchRequest {
    pub samples: Vec<IngestRequest>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTrackingRequest {
    pub trip_id:        TripId,
    pub device_id:      DeviceId,
    pub bus_id:         BusId,
    pub schedule_id:    ScheduleId,
    pub route_id:       RouteId,
    #[serde(default)]
    pub driver_id:      Option<StaffId>,
    #[serde(default)]
    pub conductor_id:   Option<StaffId>,
    #[serde(default)]
    pub start_location: Option<PointDto>,
}

impl From<StartTrackingRequest> for StartTrip {
    fn from(r: StartTrackingRequest) -> Self {
        let mut start = StartTrip::new(r.trip_id, r.device_id, r.bus_id, r.schedule_id, r.route_id)
            .crew(r.driver_id, r.conductor_id);
        start.start_location = r.start_location.map(GeoPoint::from);
        start
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTrackingRequest {
    pub trip_id:      TripId,
    pub reason:       StopReason,
    #[serde(default)]
    pub end_location: Option<PointDto>,
    #[serde(default)]
    pub notes:        Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopEventRequestDto {
    pub trip_id:            TripId,
    pub stop_id:            StopId,
    #[serde(default)]
    pub location:           Option<PointDto>,
    #[serde(default)]
    pub timestamp:          Option<Timestamp>,
    #[serde(default)]
    pub is_manual:          bool,
    #[serde(default)]
    pub confirmed_by:       Option<StaffId>,
    #[serde(default)]
    pub passenger_count:    Option<u32>,
    #[serde(default)]
    pub dwell_time_minutes: Option<f64>,
    #[serde(default)]
    pub notes:              Option<String>,
    #[serde(default)]
    pub idempotency_key:    Option<String>,
}

impl StopEventRequestDto {
    fn split(self) -> (TripId, StopEventRequest) {
        let request = StopEventRequest {
            stop_id:            self.stop_id,
            location:           self.location.map(GeoPoint::from),
            timestamp:          self.timestamp,
            is_manual:          self.is_manual,
            confirmed_by:       self.confirmed_by,
            passenger_count:    self.passenger_count,
            dwell_time_minutes: self.dwell_time_minutes,
            notes:              self.notes,
            idempotency_key:    self.idempotency_key,
        };
        (self.trip_id, request)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualConfirmRequest {
    pub event_type: StopEventType,
    #[serde(flatten)]
    pub request:    StopEventRequestDto,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripRef {
    pub trip_id: TripId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationHistoryRequest {
    pub trip_id: TripId,
    #[serde(default)]
    pub from:    Option<Timestamp>,
    #[serde(default)]
    pub to:      Option<Timestamp>,
    #[serde(default)]
    pub cursor:  Option<String>,
    #[serde(default)]
    pub limit:   Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalsRequest {
    pub stop_id:        StopId,
    pub window_minutes: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub status: TripStatus,
}

/// Every operation, tagged by `op`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ApiRequest {
    Ingest(IngestRequest),
    IngestBatch(IngestBatchRequest),
    StartTracking(StartTrackingRequest),
    StopTracking(StopTrackingRequest),
    Pause(TripRef),
    Resume(TripRef),
    RecordArrival(StopEventRequestDto),
    RecordDeparture(StopEventRequestDto),
    RecordBoarding(StopEventRequestDto),
    RecordAlighting(StopEventRequestDto),
    ConfirmManual(ManualConfirmRequest),
    CurrentLocation(TripRef),
    TripStatus(TripRef),
    NextStop(TripRef),
    LocationHistory(LocationHistoryRequest),
    StopEvents(TripRef),
    ArrivalsAtStop(ArrivalsRequest),
    TripsByStatus(StatusRequest),
    StaleTrips,
    SweepStale,
}

// ── Response DTOs ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDto {
    pub progress_fraction:       f64,
    pub distance_along_m:        f64,
    pub distance_remaining_m:    f64,
    pub distance_to_next_stop_m: Option<f64>,
    pub next_stop:               Option<StopId>,
    pub eta_next_stop:           Option<Eta>,
    pub estimated_arrival:       Eta,
    /// The sample's raw fraction regressed and was held back.
    pub noise:                   bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction:              Option<ProgressCorrection>,
}

impl From<&ProgressEstimate> for ProgressDto {
    fn from(e: &ProgressEstimate) -> Self {
        Self {
            progress_fraction:       e.progress_fraction,
            distance_along_m:        e.distance_along_m,
            distance_remaining_m:    e.distance_remaining_m,
            distance_to_next_stop_m: e.distance_to_next_stop_m,
            next_stop:               e.next_stop.clone(),
            eta_next_stop:           e.eta_next_stop,
            estimated_arrival:       e.estimated_arrival,
            noise:                   matches!(e.verdict, ProgressVerdict::HeldAsNoise { .. }),
            correction:              match e.verdict {
                ProgressVerdict::Corrected(c) => Some(c),
                _                             => None,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub accepted:        bool,
    pub late:            bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_reason: Option<ApiError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress:        Option<ProgressDto>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings:        Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub derived_events:  Vec<StopEvent>,
}

impl From<IngestOutcome> for IngestResult {
    fn from(o: IngestOutcome) -> Self {
        Self {
            accepted:        o.accepted,
            late:            o.late,
            rejected_reason: o.rejected.as_ref().map(ApiError::from),
            progress:        o.progress.as_ref().map(ProgressDto::from),
            warnings:        o.warnings,
            derived_events:  o.derived_events,
        }
    }
}

// ── TrackingApi ───────────────────────────────────────────────────────────────

/// Typed and JSON entry points over a shared engine.
pub struct TrackingApi<O: TrackingObserver> {
    engine: Arc<TrackingEngine<O>>,
}

impl<O: TrackingObserver> Clone for TrackingApi<O> {
    fn clone(&self) -> Self {
        Self { engine: Arc::clone(&self.engine) }
    }
}

impl<O: TrackingObserver> TrackingApi<O> {
    pub fn new(engine: Arc<TrackingEngine<O>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &TrackingEngine<O> {
        &self.engine
    }

    // ── Mutations ─────────────────────────────────────────────────────────

    pub fn ingest(&self, req: IngestRequest) -> ApiResponse<IngestResult> {
        let sample = req.into_sample(self.engine.clock.now());
        ApiResponse::from_result(self.engine.ingest(sample).map(IngestResult::from))
    }

    /// One response per sample, in input order.
    pub fn ingest_batch(&self, req: IngestBatchRequest) -> ApiResponse<Vec<ApiResponse<IngestResult>>> {
        let now = self.engine.clock.now();
        let samples = req.samples.into_iter().map(|r| r.into_sample(now)).collect();
        let results = self
            .engine
            .ingest_batch(samples)
            .into_iter()
            .map(|r| ApiResponse::from_result(r.map(IngestResult::from)))
            .collect();
        ApiResponse::ok(results)
    }

    pub fn start_tracking(&self, req: StartTrackingRequest) -> ApiResponse<Trip> {
        ApiResponse::from_result(self.engine.start_tracking(req.into()))
    }

    pub fn stop_tracking(&self, req: StopTrackingRequest) -> ApiResponse<Trip> {
        let stop = StopTracking {
            reason:       req.reason,
            end_location: req.end_location.map(GeoPoint::from),
            notes:        req.notes,
        };
        ApiResponse::from_result(self.engine.stop_tracking(&req.trip_id, stop))
    }

    pub fn pause(&self, req: TripRef) -> ApiResponse<Trip> {
        ApiResponse::from_result(self.engine.pause(&req.trip_id))
    }

    pub fn resume(&self, req: TripRef) -> ApiResponse<Trip> {
        ApiResponse::from_result(self.engine.resume(&req.trip_id))
    }

    pub fn record_stop_event(&self, kind: StopEventType, req: StopEventRequestDto) -> ApiResponse<StopEvent> {
        let (trip_id, request) = req.split();
        ApiResponse::from_result(self.engine.record_stop_event(&trip_id, kind, request))
    }

    pub fn confirm_manual(&self, req: ManualConfirmRequest) -> ApiResponse<StopEvent> {
        let (trip_id, request) = req.request.split();
        let confirmation = ManualConfirmation { event_type: req.event_type, request };
        ApiResponse::from_result(self.engine.confirm_manual(&trip_id, confirmation))
    }

    pub fn sweep_stale(&self) -> ApiResponse<Vec<TripId>> {
        ApiResponse::ok(self.engine.sweep_stale())
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn current_location(&self, req: TripRef) -> ApiResponse<LocationView> {
        self.query(self.engine.current_location(&req.trip_id), None, None)
    }

    pub fn trip_status(&self, req: TripRef) -> ApiResponse<TripStatusView> {
        self.query(self.engine.trip_status(&req.trip_id), None, None)
    }

    pub fn next_stop(&self, req: TripRef) -> ApiResponse<Option<NextStopView>> {
        self.query(self.engine.next_stop(&req.trip_id), None, None)
    }

    pub fn location_history(&self, req: LocationHistoryRequest) -> ApiResponse<Page<LocationSample>> {
        let range = TimeRange { from: req.from, to: req.to };
        let page = PageRequest { cursor: req.cursor, limit: req.limit };
        self.query(self.engine.location_history(&req.trip_id, range, &page), Some(range), None)
    }

    pub fn stop_events(&self, req: TripRef) -> ApiResponse<Vec<StopEvent>> {
        self.query(self.engine.stop_events(&req.trip_id), None, None)
    }

    pub fn arrivals_at_stop(&self, req: ArrivalsRequest) -> ApiResponse<Vec<ArrivalEstimate>> {
        let arrivals = self.engine.arrivals_at_stop(&req.stop_id, req.window_minutes);
        self.query(Ok(arrivals), None, Some(req.window_minutes))
    }

    pub fn trips_by_status(&self, req: StatusRequest) -> ApiResponse<Vec<TripStatusView>> {
        self.query(Ok(self.engine.trips_by_status(req.status)), None, None)
    }

    pub fn stale_trips(&self) -> ApiResponse<Vec<TripId>> {
        self.query(Ok(self.engine.stale_trips()), None, None)
    }

    // ── Dispatch ──────────────────────────────────────────────────────────

    pub fn handle(&self, request: ApiRequest) -> Value {
        use ApiRequest as R;
        match request {
            R::Ingest(r)          => to_json(self.ingest(r)),
            R::IngestBatch(r)     => to_json(self.ingest_batch(r)),
            R::StartTracking(r)   => to_json(self.start_tracking(r)),
            R::StopTracking(r)    => to_json(self.stop_tracking(r)),
            R::Pause(r)           => to_json(self.pause(r)),
            R::Resume(r)          => to_json(self.resume(r)),
            R::RecordArrival(r)   => to_json(self.record_stop_event(StopEventType::Arrival, r)),
            R::RecordDeparture(r) => to_json(self.record_stop_event(StopEventType::Departure, r)),
            R::RecordBoarding(r)  => to_json(self.record_stop_event(StopEventType::Boarding, r)),
            R::RecordAlighting(r) => to_json(self.record_stop_event(StopEventType::Alighting, r)),
            R::ConfirmManual(r)   => to_json(self.confirm_manual(r)),
            R::CurrentLocation(r) => to_json(self.current_location(r)),
            R::TripStatus(r)      => to_json(self.trip_status(r)),
            R::NextStop(r)        => to_json(self.next_stop(r)),
            R::LocationHistory(r) => to_json(self.location_history(r)),
            R::StopEvents(r)      => to_json(self.stop_events(r)),
            R::ArrivalsAtStop(r)  => to_json(self.arrivals_at_stop(r)),
            R::TripsByStatus(r)   => to_json(self.trips_by_status(r)),
            R::StaleTrips         => to_json(self.stale_trips()),
            R::SweepStale         => to_json(self.sweep_stale()),
        }
    }

    /// Parse a request document, dispatch it and serialize the response.
    /// A document that does not parse yields an `InvalidRequest` response.
    pub fn handle_json(&self, body: &str) -> String {
        let response = match serde_json::from_str::<ApiRequest>(body) {
            Ok(request) => self.handle(request),
            Err(e)      => to_json(ApiResponse::<()>::err(&TrackError::InvalidRequest(e.to_string()))),
        };
        response.to_string()
    }

    fn query<T>(&self, result: TrackResult<T>, time_range: Option<TimeRange>, window_minutes: Option<f64>) -> ApiResponse<T> {
        let metadata = Metadata { timestamp: self.engine.clock.now(), time_range, window_minutes };
        ApiResponse::from_result(result).with_metadata(metadata)
    }
}

fn to_json<T: Serialize>(response: ApiResponse<T>) -> Value {
    serde_json::to_value(&response).unwrap_or_else(|e| {
        json!({
            "success": false,
            "error": { "kind": "InvalidRequest", "message": e.to_string() },
        })
    })
}
