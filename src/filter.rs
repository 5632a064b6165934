use crate::models::Device;

/// Substring criteria typed into the filter panel. Empty means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub location: String,
    pub user: String,
    pub ssid: String,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.location.is_empty() && self.user.is_empty() && self.ssid.is_empty()
    }

    pub fn clear(&mut self) {
        *self = FilterCriteria::default();
    }

    pub fn matches(&self, device: &Device) -> bool {
        field_matches(device.location.as_deref(), &self.location)
            && field_matches(device.username.as_deref(), &self.user)
            && field_matches(device.wifi_ssid.as_deref(), &self.ssid)
    }
}

pub fn filter_devices<'a>(devices: &'a [Device], criteria: &FilterCriteria) -> Vec<&'a Device> {
    devices.iter().filter(|d| criteria.matches(d)).collect()
}

fn field_matches(field: Option<&str>, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    match field {
        Some(value) => value.to_lowercase().contains(&needle.to_lowercase()),
        None => false,
    }
}
