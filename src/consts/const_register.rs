macro_rules! register_const {
    ($(#[$meta:meta])*$name:ident, $type:ty, $value:expr) => {
        $(#[$meta])*
        pub const $name: $type = $value;
    };
    () => {};
}

pub(super) use register_const;
