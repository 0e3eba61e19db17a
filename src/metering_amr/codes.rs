use std::collections::HashMap;

use crate::models::LeakIntensity;

/// R900 history codes, used for the `Leak` and `NoUse` attributes. The code
/// is a duration bucket telling how long the condition has been observed.
pub fn get_history_table() -> HashMap<u8, &'static str> {
    let mut map = HashMap::new();

    map.insert(0, "None");
    map.insert(1, "1-2 days");
    map.insert(2, "3-7 days");
    map.insert(3, "8-14 days");
    map.insert(4, "15-21 days");
    map.insert(5, "22-34 days");
    map.insert(6, "35+ days");

    map
}

pub fn get_history_label(code: u8) -> Option<&'static str> {
    let table = get_history_table();
    table.get(&code).copied()
}

/// R900 intensity codes, used for the `BackFlow` and `LeakNow` attributes
pub fn get_intensity(code: u8) -> Option<LeakIntensity> {
    LeakIntensity::from_code(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_lookup() {
        assert_eq!(get_history_label(0), Some("None"));
        assert_eq!(get_history_label(1), Some("1-2 days"));
        assert_eq!(get_history_label(6), Some("35+ days"));
    }

    #[test]
    fn test_history_lookup_miss() {
        assert_eq!(get_history_label(7), None);
        assert_eq!(get_history_label(255), None);
    }

    #[test]
    fn test_intensity_lookup() {
        assert_eq!(get_intensity(0), Some(LeakIntensity::None));
        assert_eq!(get_intensity(1), Some(LeakIntensity::Low));
        assert_eq!(get_intensity(2), Some(LeakIntensity::High));
        assert_eq!(get_intensity(3), None);
    }
}
