/*!
# AgentX DevKit - Stubs et Utilitaires pour tester le kernel

Bibliothèque facilitant les tests du pipeline AgentX avec:
- Collaborateurs scriptés (diagnostic, notification, booking, annuaire, store)
- Builders de trames capteurs et de verdicts
- Harness connectant véhicules et dashboards sans socket
*/

pub mod frame_builder;
pub mod port_stubs;
pub mod test_utils;

pub use frame_builder::{customer, FrameBuilder, VerdictBuilder};
pub use port_stubs::StubPorts;
pub use test_utils::TestHarness;
