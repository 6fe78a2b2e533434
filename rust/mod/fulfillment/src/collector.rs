use crate::model::{CollectorInfo, CollectorProfile, CollectorSource, EffectiveCollector};

/// Who collects, once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collector {
    Profile(CollectorProfile),
    Manual(CollectorInfo),
    Unnamed,
}

impl Collector {
    /// Flatten into the record stored with the finalized order.
    pub fn resolve(&self, unnamed_label: &str) -> EffectiveCollector {
        match self {
            Collector::Profile(p) => EffectiveCollector {
                source: CollectorSource::Profile,
                profile_id: Some(p.id.clone()),
                name: p.full_name.clone(),
                phone: p.phone.clone(),
                vehicle_model: p.vehicle_model.clone(),
                vehicle_plate: p.vehicle_plate.clone(),
            },
            Collector::Manual(info) => EffectiveCollector {
                source: CollectorSource::Manual,
                profile_id: None,
                name: info.name.clone().unwrap_or_else(|| unnamed_label.to_string()),
                phone: info.phone.clone(),
                vehicle_model: info.vehicle_model.clone(),
                vehicle_plate: info.vehicle_plate.clone(),
            },
            Collector::Unnamed => EffectiveCollector {
                source: CollectorSource::Unnamed,
                profile_id: None,
                name: unnamed_label.to_string(),
                phone: None,
                vehicle_model: None,
                vehicle_plate: None,
            },
        }
    }
}

/// The operator's collector choices for one order.
///
/// Profile, manual details and the "unnamed" flag are kept side by side;
/// [`effective`](Self::effective) applies the precedence
/// `Unnamed > Manual > Profile`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorAssignment {
    profile: Option<CollectorProfile>,
    manual: CollectorInfo,
    unnamed: bool,
}

impl CollectorAssignment {
    /// Rebuild from the persisted record. A profile id that is no longer in
    /// the directory is dropped.
    pub fn restore(record: &CollectorInfo, directory: &[CollectorProfile]) -> Self {
        let record = record.normalized();
        let profile = record
            .profile_id
            .as_deref()
            .and_then(|id| directory.iter().find(|p| p.id == id))
            .cloned();
        Self {
            profile,
            manual: CollectorInfo {
                profile_id: None,
                unnamed: false,
                ..record.clone()
            },
            unnamed: record.unnamed,
        }
    }

    pub fn assign_profile(&mut self, profile: CollectorProfile) {
        self.profile = Some(profile);
        self.unnamed = false;
    }

    pub fn assign_manual(&mut self, details: &CollectorInfo) {
        self.manual = CollectorInfo {
            profile_id: None,
            unnamed: false,
            ..details.normalized()
        };
        self.unnamed = false;
    }

    pub fn mark_unnamed(&mut self) {
        self.unnamed = true;
    }

    /// Back to "nothing selected".
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn effective(&self) -> Option<Collector> {
        if self.unnamed {
            return Some(Collector::Unnamed);
        }
        if self.manual.has_manual_details() {
            return Some(Collector::Manual(self.manual.clone()));
        }
        self.profile.clone().map(Collector::Profile)
    }

    /// The record written through `collector-info`.
    pub fn to_record(&self) -> CollectorInfo {
        CollectorInfo {
            profile_id: self.profile.as_ref().map(|p| p.id.clone()),
            unnamed: self.unnamed,
            ..self.manual.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABEL: &str = "Recolector sin nombre";

    fn profile(id: &str, name: &str) -> CollectorProfile {
        CollectorProfile {
            id: id.into(),
            full_name: name.into(),
            phone: Some("555-0100".into()),
            vehicle_model: Some("Hilux".into()),
            vehicle_plate: Some("ABC-123".into()),
            role: "logistics".into(),
            active: true,
        }
    }

    fn manual(name: &str) -> CollectorInfo {
        CollectorInfo {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    #[test]
    fn nothing_selected_is_none() {
        assert_eq!(CollectorAssignment::default().effective(), None);
    }

    #[test]
    fn manual_shown_over_profile() {
        let mut a = CollectorAssignment::default();
        a.assign_profile(profile("p1", "Ana Ruiz"));
        assert!(matches!(a.effective(), Some(Collector::Profile(_))));

        a.assign_manual(&manual("Luis"));
        let resolved = a.effective().unwrap().resolve(LABEL);
        assert_eq!(resolved.source, CollectorSource::Manual);
        assert_eq!(resolved.name, "Luis");
    }

    #[test]
    fn blank_manual_does_not_override_profile() {
        let mut a = CollectorAssignment::default();
        a.assign_profile(profile("p1", "Ana Ruiz"));
        a.assign_manual(&manual("   "));
        let resolved = a.effective().unwrap().resolve(LABEL);
        assert_eq!(resolved.source, CollectorSource::Profile);
        assert_eq!(resolved.profile_id.as_deref(), Some("p1"));
    }

    #[test]
    fn unnamed_overrides_everything() {
        let mut a = CollectorAssignment::default();
        a.assign_profile(profile("p1", "Ana Ruiz"));
        a.assign_manual(&manual("Luis"));
        a.mark_unnamed();

        let resolved = a.effective().unwrap().resolve(LABEL);
        assert_eq!(resolved.source, CollectorSource::Unnamed);
        assert_eq!(resolved.name, LABEL);
        assert!(resolved.phone.is_none());

        a.clear();
        assert_eq!(a.effective(), None);
    }

    #[test]
    fn manual_without_name_uses_label() {
        let mut a = CollectorAssignment::default();
        a.assign_manual(&CollectorInfo {
            vehicle_plate: Some("XYZ-9".into()),
            ..Default::default()
        });
        let resolved = a.effective().unwrap().resolve(LABEL);
        assert_eq!(resolved.source, CollectorSource::Manual);
        assert_eq!(resolved.name, LABEL);
        assert_eq!(resolved.vehicle_plate.as_deref(), Some("XYZ-9"));
    }

    #[test]
    fn record_round_trip_restores_selection() {
        let directory = vec![profile("p1", "Ana Ruiz")];
        let mut a = CollectorAssignment::default();
        a.assign_profile(directory[0].clone());
        a.assign_manual(&manual(" Luis "));

        let record = a.to_record();
        assert_eq!(record.profile_id.as_deref(), Some("p1"));
        assert_eq!(record.name.as_deref(), Some("Luis"));

        let back = CollectorAssignment::restore(&record, &directory);
        assert_eq!(back, a);

        // Unknown profile ids are dropped.
        let gone = CollectorAssignment::restore(&record, &[]);
        assert!(matches!(gone.effective(), Some(Collector::Manual(_))));
    }
}
