//! Reference data for the demo: one five-stop line and its timetable.

use std::io::Cursor;

use tt_core::GeoPoint;
use tt_route::{
    InMemoryRouteCatalog, InMemoryScheduleCatalog, RouteResult, load_routes_reader,
    load_schedule_reader,
};

pub const ROUTE_ID:    &str = "L1";
pub const SCHEDULE_ID: &str = "SCH1";

const SHAPES_CSV: &str = "\
route_id,sequence,lat,lon\n\
L1,0,12.9716,77.5946\n\
L1,1,12.9716,77.6036\n\
L1,2,12.9780,77.6090\n\
L1,3,12.9850,77.6090\n\
L1,4,12.9900,77.6030\n\
";

// Stops sit on the shape vertices; distances are left to projection.
const STOPS_CSV: &str = "\
route_id,stop_id,name,lat,lon,sequence,distance_from_start_m\n\
L1,S1,Majestic,12.9716,77.5946,1,\n\
L1,S2,Corporation,12.9716,77.6036,2,\n\
L1,S3,Richmond Circle,12.9780,77.6090,3,\n\
L1,S4,Shivajinagar,12.9850,77.6090,4,\n\
L1,S5,Cantonment,12.9900,77.6030,5,\n\
";

const SCHEDULE_CSV: &str = "\
schedule_id,stop_id,arrival,departure\n\
SCH1,S1,2024-05-01T08:00:00Z,2024-05-01T08:00:30Z\n\
SCH1,S2,2024-05-01T08:03:00Z,2024-05-01T08:03:30Z\n\
SCH1,S3,2024-05-01T08:06:00Z,2024-05-01T08:06:30Z\n\
SCH1,S4,2024-05-01T08:09:00Z,2024-05-01T08:09:30Z\n\
SCH1,S5,2024-05-01T08:12:00Z,\n\
";

/// Stop ids in route order.
pub fn stop_ids() -> Vec<String> {
    (1..=5).map(|i| format!("S{i}")).collect()
}

/// Shape vertices in route order; vertex `i` is stop `i`.
pub fn vertices() -> Vec<GeoPoint> {
    SHAPES_CSV
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split(',').skip(2);
            let lat = cols.next()?.parse().ok()?;
            let lon = cols.next()?.parse().ok()?;
            Some(GeoPoint::new(lat, lon))
        })
        .collect()
}

pub fn load() -> RouteResult<(InMemoryRouteCatalog, InMemoryScheduleCatalog)> {
    let routes = load_routes_reader(Cursor::new(SHAPES_CSV), Cursor::new(STOPS_CSV))?;
    let schedule = load_schedule_reader(Cursor::new(SCHEDULE_CSV))?;
    Ok((routes, schedule))
}
