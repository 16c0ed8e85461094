// Execution/GC tracing, toggled at runtime rather than compiled out.
//
// The teacher's own `trace!` gated debug printing on `cfg(test)`; here the
// same macro is driven by an explicit runtime flag so `--trace`/`--trace-gc`
// can turn it on outside of tests too.

#[macro_export]
macro_rules! trace(
    ( $flag:expr, $($thing:expr),* ) => {
        if $flag { println!( $($thing),* ); }
    };
);

#[macro_export]
macro_rules! trace_gc(
    ( $flag:expr, $($thing:expr),* ) => {
        if $flag { eprintln!( $($thing),* ); }
    };
);
