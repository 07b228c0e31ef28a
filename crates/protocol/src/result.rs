use sfap_wire::WireEnum;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        $vis enum $name {
            $($variant = $value),+
        }

        impl WireEnum for $name {
            fn to_wire(self) -> u8 {
                self as u8
            }

            fn from_wire(byte: u8) -> Option<Self> {
                match byte {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

wire_enum! {
    /// Outcome of a generic command dispatch (command middleware decision,
    /// or a built-in handler's own result).
    pub enum CommandResult {
        Ok = 0,
        AccessDenied = 1,
        Unavailable = 2,
        Disabled = 3,
        Unsupported = 4,
        MiddlewareError = 5,
        Unknown = 6,
    }
}

wire_enum! {
    /// Outcome of an `AUTH` attempt.
    pub enum AuthResult {
        Ok = 0,
        UnknownUser = 1,
        WrongPassword = 2,
        UserDisabled = 3,
        UserLimitReached = 4,
        MiddlewareError = 5,
    }
}

wire_enum! {
    /// Outcome of a sandboxed path operation.
    pub enum AccessResult {
        Ok = 0,
        AccessDenied = 1,
        OutsideRoot = 2,
        IsNotDirectory = 3,
        CantOpenFile = 4,
        InternalError = 5,
    }
}

wire_enum! {
    /// Kind of filesystem entry reported by `LS`.
    pub enum FileType {
        None = 0,
        Directory = 1,
        Regular = 2,
        Symlink = 3,
        Block = 4,
        Character = 5,
        Fifo = 6,
        Socket = 7,
        NotFound = 8,
        Unknown = 9,
    }
}

impl From<std::fs::FileType> for FileType {
    fn from(ft: std::fs::FileType) -> Self {
        if ft.is_dir() {
            Self::Directory
        } else if ft.is_file() {
            Self::Regular
        } else if ft.is_symlink() {
            Self::Symlink
        } else {
            Self::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_result_round_trips_every_variant() {
        for (value, byte) in [
            (CommandResult::Ok, 0),
            (CommandResult::AccessDenied, 1),
            (CommandResult::Unavailable, 2),
            (CommandResult::Disabled, 3),
            (CommandResult::Unsupported, 4),
            (CommandResult::MiddlewareError, 5),
            (CommandResult::Unknown, 6),
        ] {
            assert_eq!(value.to_wire(), byte);
            assert_eq!(CommandResult::from_wire(byte), Some(value));
        }

        assert_eq!(CommandResult::from_wire(200), None);
    }

    #[test]
    fn access_result_round_trips_every_variant() {
        for (value, byte) in [
            (AccessResult::Ok, 0),
            (AccessResult::AccessDenied, 1),
            (AccessResult::OutsideRoot, 2),
            (AccessResult::IsNotDirectory, 3),
            (AccessResult::CantOpenFile, 4),
            (AccessResult::InternalError, 5),
        ] {
            assert_eq!(value.to_wire(), byte);
            assert_eq!(AccessResult::from_wire(byte), Some(value));
        }
    }
}
