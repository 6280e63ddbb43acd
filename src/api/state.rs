use crate::loadtest::LoadGenerator;
use crate::notify::Notifier;
use crate::tcp::ConnectionManager;

#[derive(Clone)]
pub struct AppState {
    pub manager: ConnectionManager,
    pub load_generator: LoadGenerator,
    pub notifier: Notifier,
}
