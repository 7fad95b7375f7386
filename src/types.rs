use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(u32);

impl TreeId {
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl FromStr for TreeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("dir-id {:?} is not a number", s));
        }
        s.parse::<u32>()
            .map(TreeId)
            .map_err(|_| format!("dir-id {:?} is out of range", s))
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirAction {
    Mount,
    Umount,
}

impl FromStr for DirAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mount" => Ok(DirAction::Mount),
            "umount" => Ok(DirAction::Umount),
            _ => Err(format!("action {:?}; expected mount or umount", s)),
        }
    }
}

impl DirAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirAction::Mount => "mount",
            DirAction::Umount => "umount",
        }
    }
}

/// Completion time of a snapshot, seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn seconds(&self) -> i64 {
        self.0
    }
}

impl From<i64> for Timestamp {
    fn from(seconds: i64) -> Self {
        Timestamp(seconds)
    }
}

impl FromStr for Timestamp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("timestamp {:?} is not a number", s));
        }
        s.parse::<i64>()
            .map(Timestamp)
            .map_err(|_| format!("timestamp {:?} is out of range", s))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_id_rejects_non_numeric() {
        assert!("0".parse::<TreeId>().is_ok());
        assert!("12".parse::<TreeId>().is_ok());
        assert!("".parse::<TreeId>().is_err());
        assert!("-1".parse::<TreeId>().is_err());
        assert!("1a".parse::<TreeId>().is_err());
    }

    #[test]
    fn dir_action_parses_both_cases() {
        assert_eq!("mount".parse::<DirAction>().unwrap(), DirAction::Mount);
        assert_eq!("UMOUNT".parse::<DirAction>().unwrap(), DirAction::Umount);
        assert!("remount".parse::<DirAction>().is_err());
    }

    #[test]
    fn timestamp_parses_digits_only() {
        assert_eq!("1700000000".parse::<Timestamp>().unwrap().seconds(), 1700000000);
        assert!("17e9".parse::<Timestamp>().is_err());
    }
}
