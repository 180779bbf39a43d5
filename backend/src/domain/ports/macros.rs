//! `define_port_error!`: port error enums with generated helpers.
//!
//! Every variant `FooBar { .. }` gets a `foo_bar(..)` constructor whose
//! parameters accept `impl Into<FieldType>`, and an `is_foo_bar()` predicate.

macro_rules! define_port_error {
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@helpers $variant $( { $($field : $ty),* } )?);
            )*
        }
    };

    (@helpers $variant:ident) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
        define_port_error!(@predicate $variant);
    };

    (@helpers $variant:ident { $($field:ident : $ty:ty),* }) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]($($field: impl Into<$ty>),*) -> Self {
                Self::$variant { $($field: $field.into()),* }
            }
        }
        define_port_error!(@predicate $variant);
    };

    (@predicate $variant:ident) => {
        ::paste::paste! {
            pub fn [<is_ $variant:snake>](&self) -> bool {
                matches!(self, Self::$variant { .. })
            }
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    //! Constructor generation for port error enums.
    define_port_error! {
        pub enum ProbePortError {
            Unreachable => "store unreachable",
            Rejected { message: String } => "rejected: {message}",
            Throttled { retry_after_secs: u64 } => "throttled for {retry_after_secs}s",
            Corrupt { key: String, message: String } => "corrupt object {key}: {message}",
        }
    }

    #[test]
    fn unit_variants_get_zero_argument_constructors() {
        assert_eq!(ProbePortError::unreachable().to_string(), "store unreachable");
    }

    #[test]
    fn string_fields_accept_borrowed_input() {
        let err = ProbePortError::rejected("bad token");
        assert_eq!(
            err,
            ProbePortError::Rejected {
                message: "bad token".to_owned()
            }
        );
    }

    #[test]
    fn numeric_fields_keep_their_type() {
        let err = ProbePortError::throttled(30_u64);
        assert_eq!(err.to_string(), "throttled for 30s");
    }

    #[test]
    fn multiple_fields_are_taken_in_declaration_order() {
        let err = ProbePortError::corrupt("1/2.json", String::from("truncated"));
        assert_eq!(err.to_string(), "corrupt object 1/2.json: truncated");
    }

    #[test]
    fn predicates_match_only_their_variant() {
        let err = ProbePortError::throttled(5_u64);
        assert!(err.is_throttled());
        assert!(!err.is_unreachable());
        assert!(ProbePortError::unreachable().is_unreachable());
    }
}
