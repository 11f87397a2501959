use syn::{
    Ident, ItemFn, LitInt,
    parse::{Parse, ParseStream}, token::{Comma, Eq},
};

/// Helper function to get function name as string
pub fn get_fn_name(func: &ItemFn) -> String {
    func.sig.ident.to_string()
}

/// Arguments accepted by `#[measure_time(...)]`, e.g. `#[measure_time(warn_after_ms = 500)]`
#[derive(Default)]
pub struct MacroArgs {
    pub warn_after_ms: Option<u64>,
}

impl Parse for MacroArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = MacroArgs::default();

        while !input.is_empty() {
            let name: Ident = input.parse()?;
            input.parse::<Eq>()?;
            let value: LitInt = input.parse()?;

            match name.to_string().as_str() {
                "warn_after_ms" => args.warn_after_ms = Some(value.base10_parse()?),
                other => {
                    return Err(syn::Error::new(name.span(), format!("unknown argument `{}`", other)));
                }
            }

            if input.peek(Comma) {
                input.parse::<Comma>()?;
            }
        }

        Ok(args)
    }
}
