pub mod analytics;
pub mod event;
pub mod response;
pub mod scan;
pub mod token;

pub use event::{Attendee, AttendeeProfile, Booth, BoothProfile, Event, Profile};
pub use response::ApiResponse;
pub use scan::{ScanRecord, ScanResult};
pub use token::{QrToken, Role};
