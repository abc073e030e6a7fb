/*!
# Probe DevKit - Fixtures et faux collecteur pour les tests

Bibliothèque facilitant l'écriture des tests du kernel et de l'agent :
- Construction de payloads `/report` conformes au format filaire
- Collecteur HTTP factice qui enregistre les rapports reçus
*/

pub mod snapshot_builder;
pub mod mock_collector;

pub use mock_collector::{MockCollector, ReceivedReport};
pub use snapshot_builder::SnapshotBuilder;
