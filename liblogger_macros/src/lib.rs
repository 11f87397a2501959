/*
 * Procedural macros for logging instrumentation
 *
 * Attribute macros applied to plain (non-async) functions. The generated code
 * calls the `liblogger` macros, so the annotated crate must depend on liblogger.
 */

extern crate proc_macro;

mod macro_utils;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, parse_quote, ItemFn};

use crate::macro_utils::{get_fn_name, MacroArgs};

/// Log entry and exit of a function at debug level
#[proc_macro_attribute]
pub fn log_entry_exit(_args: TokenStream, input: TokenStream) -> TokenStream {
    let mut input_fn = parse_macro_input!(input as ItemFn);
    let fn_name = get_fn_name(&input_fn);
    let orig_block = input_fn.block.clone();

    input_fn.block = Box::new(parse_quote!({
        liblogger::log_debug!(&format!("ENTRY: {}", #fn_name));

        #[allow(clippy::redundant_closure_call)]
        let result = (|| #orig_block)();

        liblogger::log_debug!(&format!("EXIT: {}", #fn_name));
        result
    }));

    TokenStream::from(quote!(#input_fn))
}

/// Measure execution time of a function.
///
/// Logs the elapsed time at debug level; with `warn_after_ms = N` a run longer
/// than N milliseconds is logged as a warning instead. A panic is logged at
/// error level with the elapsed time and then resumed.
#[proc_macro_attribute]
pub fn measure_time(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as MacroArgs);
    let mut input_fn = parse_macro_input!(input as ItemFn);
    let fn_name = get_fn_name(&input_fn);
    let orig_block = input_fn.block.clone();
    let warn_after_ms = match args.warn_after_ms {
        Some(ms) => quote!(Some(#ms as u128)),
        None => quote!(None::<u128>),
    };

    input_fn.block = Box::new(parse_quote!({
        use std::time::Instant;
        use std::panic::{catch_unwind, AssertUnwindSafe};

        let start_time = Instant::now();

        let result = catch_unwind(AssertUnwindSafe(|| #orig_block));

        let duration_ms = start_time.elapsed().as_millis();

        match result {
            Ok(output) => {
                match #warn_after_ms {
                    Some(limit) if duration_ms > limit => {
                        liblogger::log_warn!(
                            &format!("{} completed in {} ms (limit {} ms)", #fn_name, duration_ms, limit),
                            None
                        );
                    }
                    _ => {
                        liblogger::log_debug!(&format!("{} completed in {} ms", #fn_name, duration_ms), None);
                    }
                }
                output
            },
            Err(panic_err) => {
                liblogger::log_error!(
                    &format!("{} panicked after {} ms", #fn_name, duration_ms),
                    None
                );
                std::panic::resume_unwind(panic_err);
            }
        }
    }));

    TokenStream::from(quote!(#input_fn))
}
