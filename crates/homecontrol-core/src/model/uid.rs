// ── Uid helpers ──
//
// Element uids look like `<TypeTag>:<deviceUid>[:secure][#<subIndex>]`,
// setting uids like `<settingTag>.<deviceUid>[#<subIndex>]`. Every
// owner lookup goes through these functions.

/// Device uid owning an element uid.
///
/// ```
/// use homecontrol_core::model::uid::device_uid;
/// assert_eq!(
///     device_uid("devolo.Meter:hdm:ZWave:F6BF9812/2:secure#2"),
///     "hdm:ZWave:F6BF9812/2"
/// );
/// ```
pub fn device_uid(element_uid: &str) -> &str {
    let rest = element_uid
        .split_once(':')
        .map_or(element_uid, |(_, rest)| rest);
    let rest = strip_sub_index(rest);
    rest.strip_suffix(":secure").unwrap_or(rest)
}

/// Device uid owning a setting uid.
pub fn setting_device_uid(setting_uid: &str) -> &str {
    let rest = setting_uid
        .split_once('.')
        .map_or(setting_uid, |(_, rest)| rest);
    strip_sub_index(rest)
}

/// Type tag of an element uid (`devolo.Meter` for `devolo.Meter:hdm:...`).
pub fn type_tag(element_uid: &str) -> &str {
    element_uid
        .split_once(':')
        .map_or(element_uid, |(tag, _)| tag)
}

/// Setting tag of a setting uid (`lis` for `lis.hdm:...`).
pub fn setting_tag(setting_uid: &str) -> &str {
    setting_uid
        .split_once('.')
        .map_or(setting_uid, |(tag, _)| tag)
}

fn strip_sub_index(uid: &str) -> &str {
    uid.split_once('#').map_or(uid, |(head, _)| head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_uid_to_device_uid() {
        assert_eq!(
            device_uid("devolo.BinarySwitch:hdm:ZWave:F6BF9812/2"),
            "hdm:ZWave:F6BF9812/2"
        );
        assert_eq!(
            device_uid("devolo.BinarySwitch:hdm:ZWave:F6BF9812/2#2"),
            "hdm:ZWave:F6BF9812/2"
        );
        assert_eq!(
            device_uid("devolo.BinarySwitch:hdm:ZWave:F6BF9812/2:secure#2"),
            "hdm:ZWave:F6BF9812/2"
        );
        assert_eq!(
            device_uid("devolo.BinarySwitch:hdm:ZWave:F6BF9812/2:secure"),
            "hdm:ZWave:F6BF9812/2"
        );
    }

    #[test]
    fn setting_uid_to_device_uid() {
        assert_eq!(setting_device_uid("lis.hdm:ZWave:F6BF9812/2"), "hdm:ZWave:F6BF9812/2");
        assert_eq!(
            setting_device_uid("stmss.hdm:ZWave:F6BF9812/2#1"),
            "hdm:ZWave:F6BF9812/2"
        );
    }

    #[test]
    fn tags() {
        assert_eq!(type_tag("devolo.Meter:hdm:ZWave:F6BF9812/2#2"), "devolo.Meter");
        assert_eq!(setting_tag("gds.hdm:ZWave:F6BF9812/2"), "gds");
    }

    #[test]
    fn uid_without_separator_is_returned_unchanged() {
        assert_eq!(device_uid("hdm"), "hdm");
        assert_eq!(setting_device_uid("hdm"), "hdm");
    }
}
