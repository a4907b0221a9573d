pub use enclose::*;

#[macro_export]
macro_rules! computed {
    (( $($d_tt:tt)* ) => $($b:tt)*) => {
        $crate::Computed::new($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    (=> $($b:tt)*) => {
        $crate::Computed::new(move || { $($b)* })
    };
}

#[macro_export]
macro_rules! effect {
    (( $($d_tt:tt)* ) => $($b:tt)*) => {
        $crate::effect($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    (=> $($b:tt)*) => {
        $crate::effect(move || { $($b)* })
    };
}

#[macro_export]
macro_rules! watch_effect {
    (( $($d_tt:tt)* ) => $($b:tt)*) => {
        $crate::watch_effect(
            $crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }),
            $crate::Flush::Pre,
        )
    };
    (=> $($b:tt)*) => {
        $crate::watch_effect(move || { $($b)* }, $crate::Flush::Pre)
    };
}
