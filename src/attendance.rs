//! Home-gym and live-occupancy lookups.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::directory::GymRecord;
use crate::error::{MonitorError, Result};
use crate::session::{TokenSession, truncate};

/// People in the gym at the moment the vendor last refreshed its count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceSnapshot {
    pub people: u32,
    pub refreshed_at: DateTime<Utc>,
}

impl AttendanceSnapshot {
    pub fn level(&self) -> AttendanceLevel {
        AttendanceLevel::from_count(self.people)
    }
}

/// How crowded the gym is, derived from the head count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttendanceLevel {
    Light,
    Moderate,
    Busy,
    VeryBusy,
}

impl AttendanceLevel {
    pub fn from_count(people: u32) -> Self {
        match people {
            0..=20 => AttendanceLevel::Light,
            21..=40 => AttendanceLevel::Moderate,
            41..=60 => AttendanceLevel::Busy,
            _ => AttendanceLevel::VeryBusy,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AttendanceLevel::Light => "Light",
            AttendanceLevel::Moderate => "Moderate",
            AttendanceLevel::Busy => "Busy",
            AttendanceLevel::VeryBusy => "Very Busy",
        }
    }

    /// 1 (quiet) to 4 (packed).
    pub fn severity(self) -> u8 {
        match self {
            AttendanceLevel::Light => 1,
            AttendanceLevel::Moderate => 2,
            AttendanceLevel::Busy => 3,
            AttendanceLevel::VeryBusy => 4,
        }
    }
}

impl std::fmt::Display for AttendanceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Member profile; only the embedded home gym is of interest.
#[derive(Debug, Deserialize)]
struct MemberResponse {
    #[serde(rename = "HomeGym")]
    home_gym: Option<GymRecord>,
}

#[derive(Debug, Deserialize)]
struct GymSessionResponse {
    #[serde(rename = "TotalPeopleInGym")]
    total_people_in_gym: Option<i64>,
    #[serde(rename = "LastRefreshed")]
    last_refreshed: Option<String>,
}

impl GymSessionResponse {
    fn into_snapshot(self) -> Result<AttendanceSnapshot> {
        let people = self
            .total_people_in_gym
            .ok_or_else(|| MonitorError::MalformedResponse("missing TotalPeopleInGym".into()))?;
        let people = u32::try_from(people).map_err(|_| {
            MonitorError::MalformedResponse(format!("invalid TotalPeopleInGym: {people}"))
        })?;
        let raw = self
            .last_refreshed
            .ok_or_else(|| MonitorError::MalformedResponse("missing LastRefreshed".into()))?;
        let refreshed_at = parse_refreshed(&raw)
            .ok_or_else(|| MonitorError::MalformedResponse(format!("invalid LastRefreshed: {raw}")))?;

        Ok(AttendanceSnapshot {
            people,
            refreshed_at,
        })
    }
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_refreshed(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Read-only client for the member profile and occupancy endpoints.
#[derive(Clone, Debug)]
pub struct AttendanceClient {
    session: TokenSession,
}

impl AttendanceClient {
    pub fn new(session: TokenSession) -> Self {
        Self { session }
    }

    /// Fetch the authenticated member's home gym.
    pub async fn get_home_gym(&self) -> Result<GymRecord> {
        let response = self.session.get("/member").await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!(%status, "Member profile error body: {}", truncate(&body, 500));
            return Err(MonitorError::HomeGymUnavailable);
        }
        tracing::debug!(length = body.len(), "Member profile received");

        let member: MemberResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::debug!("Failed to parse member profile: {}", e);
            MonitorError::HomeGymUnavailable
        })?;

        let gym = member.home_gym.ok_or(MonitorError::HomeGymUnavailable)?;
        tracing::debug!(id = gym.id, name = %gym.name, "Home gym parsed");
        Ok(gym)
    }

    /// Fetch live occupancy for a gym.
    pub async fn get_attendance(&self, gym_id: i64) -> Result<AttendanceSnapshot> {
        let response = self
            .session
            .get(&format!("/gymSessions/gym?gymId={gym_id}"))
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::Status(status));
        }

        let body = response.text().await?;
        let payload: GymSessionResponse = serde_json::from_str(&body)
            .map_err(|e| MonitorError::MalformedResponse(format!("gym session: {e}")))?;
        payload.into_snapshot()
    }
}
