use crate::envelope::ProtocolError;

/// Request action codes.
///
/// The set is closed and the numeric values are stable across versions;
/// hubs older or newer than this agent rely on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Action {
    GetData = 0,
    CheckFingerprint = 1,
    GetContainerLogs = 2,
    GetContainerInfo = 3,
    GetSmartData = 4,
    GetSystemdInfo = 5,
}

impl Action {
    /// Returns the wire code for this action.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Action {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Action::GetData),
            1 => Ok(Action::CheckFingerprint),
            2 => Ok(Action::GetContainerLogs),
            3 => Ok(Action::GetContainerInfo),
            4 => Ok(Action::GetSmartData),
            5 => Ok(Action::GetSystemdInfo),
            other => Err(ProtocolError::UnknownAction(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_codes_are_stable() {
        assert_eq!(Action::GetData.code(), 0);
        assert_eq!(Action::CheckFingerprint.code(), 1);
        assert_eq!(Action::GetContainerLogs.code(), 2);
        assert_eq!(Action::GetContainerInfo.code(), 3);
        assert_eq!(Action::GetSmartData.code(), 4);
        assert_eq!(Action::GetSystemdInfo.code(), 5);
    }

    #[test]
    fn action_roundtrip() {
        for code in 0u8..=5 {
            let action = Action::try_from(code).unwrap();
            assert_eq!(action.code(), code);
        }
    }

    #[test]
    fn unknown_action_code_rejected() {
        let err = Action::try_from(42).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownAction(42)));
    }
}
