//! Process bootstrap helpers: environment loading and prebuilt boot
//! handlers for the common "turn config into container options" patterns.

use crate::app::BootEvent;
use crate::config::ConfigSection;
use crate::container::Container;
use crate::error::Error;
use crate::hooks::{HandlerFunc, handler_fn};

/// Load environment variables from a dotenv file before anything reads the
/// process environment.
///
/// Honors `DOTENV_PATH` as an explicit file override; otherwise searches
/// for a `.env` starting at the current directory. A missing file is not
/// an error.
pub fn load_dotenv() {
    match std::env::var("DOTENV_PATH") {
        Ok(path) => {
            let _ = dotenvy::from_path(path);
        }
        Err(_) => {
            let _ = dotenvy::dotenv();
        }
    }
}

/// Boot handler that appends a fixed set of container options and
/// advances.
pub fn boot_options<C>(options: Vec<C::Option>) -> HandlerFunc<BootEvent<C>>
where
    C: Container,
    C::Option: Clone + Sync,
{
    handler_fn(move |event: &mut BootEvent<C>, next| {
        event.options.extend(options.iter().cloned());
        Box::pin(async move { next.run(event).await })
    })
}

/// Boot handler that loads a config section through the event's loader,
/// maps it to container options with `into_options`, appends them and
/// advances. A load or validation failure stops the boot.
pub fn boot_config<C, T, F>(into_options: F) -> HandlerFunc<BootEvent<C>>
where
    C: Container,
    T: ConfigSection + 'static,
    F: Fn(T) -> Vec<C::Option> + Send + Sync + 'static,
{
    handler_fn(move |event: &mut BootEvent<C>, next| {
        let loaded = event
            .config
            .load::<T>()
            .map(&into_options)
            .map_err(Error::from);
        Box::pin(async move {
            event.options.extend(loaded?);
            next.run(event).await
        })
    })
}
