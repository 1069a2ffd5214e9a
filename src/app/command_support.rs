use crate::config::Settings;
use crate::ownership::{ControllerId, ControllerIdentity, CONTROLLER_ID_ENV};
use crate::state::{default_state_root_path, LaunchRegistry, PathLayout, ThreadRegistry};

#[derive(Debug, Clone)]
pub struct AppContext {
    pub layout: PathLayout,
    pub settings: Settings,
    pub controller: ControllerId,
}

impl AppContext {
    pub fn bootstrap() -> Result<Self, String> {
        let root = default_state_root_path().map_err(|e| e.to_string())?;
        let layout = PathLayout::new(root);
        layout.ensure().map_err(|e| e.to_string())?;
        let settings = Settings::load(&layout).map_err(|e| e.to_string())?;

        let override_value = std::env::var(CONTROLLER_ID_ENV).ok();
        let controller = ControllerIdentity::system()
            .with_pattern(settings.controller_pattern.clone())
            .with_max_depth(settings.max_ancestry_depth)
            .resolve_or_fallback(override_value.as_deref(), std::process::id());

        Ok(Self {
            layout,
            settings,
            controller,
        })
    }

    pub fn thread_registry(&self) -> ThreadRegistry {
        ThreadRegistry::for_layout(&self.layout).with_lock_options(self.settings.lock_options())
    }

    pub fn launch_registry(&self) -> LaunchRegistry {
        LaunchRegistry::for_layout(&self.layout).with_lock_options(self.settings.lock_options())
    }
}

pub(crate) fn parse_u64_flag(flag: &str, value: Option<&String>) -> Result<u64, String> {
    let raw = value.ok_or_else(|| format!("{flag} requires a value"))?;
    raw.parse::<u64>()
        .map_err(|_| format!("{flag} expects a non-negative integer, got `{raw}`"))
}
