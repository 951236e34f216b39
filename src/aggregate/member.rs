//! Member Aggregate
//!
//! Profile and lifecycle of a platform member. The counter fields are
//! denormalized state written only by the counter materializer; this
//! aggregate reads them but never changes them.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{DomainError, DomainEvent, ProfileField};

use super::{status_enum, Aggregate};

/// Member status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Pending,
    Active,
    Deactivated,
}

status_enum!(MemberStatus, "member", {
    Pending => "PENDING",
    Active => "ACTIVE",
    Deactivated => "DEACTIVATED",
});

/// Requested profile changes; `None` leaves the attribute untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileChanges {
    pub nickname: Option<String>,
    pub image_id: Option<Uuid>,
    pub introduction: Option<String>,
}

/// Persisted shape of a member row
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRecord {
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
    pub image_id: Option<Uuid>,
    pub introduction: Option<String>,
    pub status: MemberStatus,
    pub followers_count: i64,
    pub followings_count: i64,
    pub post_count: i64,
    pub friend_count: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// Member Aggregate
#[derive(Debug, Clone)]
pub struct Member {
    record: MemberRecord,
    events: Vec<DomainEvent>,
}

impl Member {
    /// Register a new member in PENDING status
    pub fn register(id: Uuid, email: String, nickname: String) -> Result<Self, DomainError> {
        if !email.contains('@') {
            return Err(DomainError::InvalidInput(format!("Invalid email: {}", email)));
        }
        let nickname = validate_nickname(nickname)?;

        let mut member = Self {
            record: MemberRecord {
                id,
                email,
                nickname,
                image_id: None,
                introduction: None,
                status: MemberStatus::Pending,
                followers_count: 0,
                followings_count: 0,
                post_count: 0,
                friend_count: 0,
                version: 0,
                created_at: Utc::now(),
            },
            events: Vec::new(),
        };
        member.events.push(DomainEvent::MemberRegistered { member_id: id });
        Ok(member)
    }

    /// Rebuild from database state
    pub fn from_record(record: MemberRecord) -> Self {
        Self {
            record,
            events: Vec::new(),
        }
    }

    /// Activate a pending or deactivated member
    pub fn activate(&mut self) -> Result<(), DomainError> {
        if self.record.status == MemberStatus::Active {
            return Err(DomainError::AlreadyActive("member"));
        }

        self.record.status = MemberStatus::Active;
        self.events.push(DomainEvent::MemberActivated {
            member_id: self.record.id,
        });
        Ok(())
    }

    /// Deactivate an active member
    pub fn deactivate(&mut self) -> Result<(), DomainError> {
        if self.record.status != MemberStatus::Active {
            return Err(DomainError::invalid_transition(
                "member",
                "deactivate",
                self.record.status,
            ));
        }

        self.record.status = MemberStatus::Deactivated;
        self.events.push(DomainEvent::MemberDeactivated {
            member_id: self.record.id,
        });
        Ok(())
    }

    /// Apply profile changes; attributes equal to the current value are ignored
    pub fn update_profile(&mut self, changes: ProfileChanges) -> Result<(), DomainError> {
        if self.record.status != MemberStatus::Active {
            return Err(DomainError::invalid_transition(
                "member",
                "update profile of",
                self.record.status,
            ));
        }

        let mut updated_fields = Vec::new();
        let mut new_nickname = None;
        let mut new_image_id = None;

        if let Some(nickname) = changes.nickname {
            let nickname = validate_nickname(nickname)?;
            if nickname != self.record.nickname {
                self.record.nickname = nickname.clone();
                new_nickname = Some(nickname);
                updated_fields.push(ProfileField::Nickname);
            }
        }
        if let Some(image_id) = changes.image_id {
            if Some(image_id) != self.record.image_id {
                self.record.image_id = Some(image_id);
                new_image_id = Some(image_id);
                updated_fields.push(ProfileField::Image);
            }
        }
        if let Some(introduction) = changes.introduction {
            if Some(&introduction) != self.record.introduction.as_ref() {
                self.record.introduction = Some(introduction);
                updated_fields.push(ProfileField::Introduction);
            }
        }

        if updated_fields.is_empty() {
            return Err(DomainError::InvalidInput("No changes provided".to_string()));
        }

        self.events.push(DomainEvent::MemberProfileUpdated {
            member_id: self.record.id,
            updated_fields,
            new_nickname,
            new_image_id,
        });
        Ok(())
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn record(&self) -> &MemberRecord {
        &self.record
    }

    pub fn email(&self) -> &str {
        &self.record.email
    }

    pub fn nickname(&self) -> &str {
        &self.record.nickname
    }

    pub fn status(&self) -> MemberStatus {
        self.record.status
    }

    pub fn is_active(&self) -> bool {
        self.record.status == MemberStatus::Active
    }

    pub fn followers_count(&self) -> i64 {
        self.record.followers_count
    }

    pub fn followings_count(&self) -> i64 {
        self.record.followings_count
    }

    pub fn post_count(&self) -> i64 {
        self.record.post_count
    }

    pub fn friend_count(&self) -> i64 {
        self.record.friend_count
    }
}

fn validate_nickname(nickname: String) -> Result<String, DomainError> {
    let trimmed = nickname.trim();
    if trimmed.is_empty() || trimmed.chars().count() > 30 {
        return Err(DomainError::InvalidInput(
            "Nickname must be 1 to 30 characters".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

impl Aggregate for Member {
    fn aggregate_type() -> &'static str {
        "Member"
    }

    fn id(&self) -> Uuid {
        self.record.id
    }

    fn version(&self) -> i64 {
        self.record.version
    }

    fn mark_persisted(&mut self, version: i64) {
        self.record.version = version;
    }

    fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_member() -> Member {
        let mut member = Member::register(
            Uuid::new_v4(),
            "alice@example.com".to_string(),
            "alice".to_string(),
        )
        .unwrap();
        member.activate().unwrap();
        member.take_events();
        member
    }

    #[test]
    fn test_register_records_event() {
        let id = Uuid::new_v4();
        let mut member =
            Member::register(id, "bob@example.com".to_string(), "  bob ".to_string()).unwrap();

        assert_eq!(member.status(), MemberStatus::Pending);
        assert_eq!(member.nickname(), "bob");
        assert!(member.is_new());
        assert_eq!(
            member.take_events(),
            vec![DomainEvent::MemberRegistered { member_id: id }]
        );
        assert!(member.take_events().is_empty());
    }

    #[test]
    fn test_register_rejects_bad_email() {
        let result = Member::register(Uuid::new_v4(), "nope".to_string(), "bob".to_string());
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
    }

    #[test]
    fn test_activate_twice_fails() {
        let mut member = active_member();
        assert_eq!(member.activate(), Err(DomainError::AlreadyActive("member")));
        assert!(member.take_events().is_empty());
    }

    #[test]
    fn test_deactivate_then_reactivate() {
        let mut member = active_member();
        member.deactivate().unwrap();
        assert_eq!(member.status(), MemberStatus::Deactivated);

        assert!(member.deactivate().is_err());
        member.activate().unwrap();
        assert!(member.is_active());
        assert_eq!(member.take_events().len(), 2);
    }

    #[test]
    fn test_update_profile_reports_changed_fields_only() {
        let mut member = active_member();
        let image_id = Uuid::new_v4();

        member
            .update_profile(ProfileChanges {
                nickname: Some("alice".to_string()),
                image_id: Some(image_id),
                introduction: None,
            })
            .unwrap();

        let events = member.take_events();
        assert_eq!(
            events,
            vec![DomainEvent::MemberProfileUpdated {
                member_id: member.id(),
                updated_fields: vec![ProfileField::Image],
                new_nickname: None,
                new_image_id: Some(image_id),
            }]
        );
    }

    #[test]
    fn test_update_profile_without_changes_fails() {
        let mut member = active_member();
        let result = member.update_profile(ProfileChanges::default());
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
    }

    #[test]
    fn test_status_round_trips_through_text() {
        assert_eq!("DEACTIVATED".parse::<MemberStatus>(), Ok(MemberStatus::Deactivated));
        assert!("deleted".parse::<MemberStatus>().is_err());
    }
}
