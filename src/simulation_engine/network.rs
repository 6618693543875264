use crate::simulation_engine::intersections::{
    Direction, Intersection, IntersectionId, IntersectionIndex, Phase,
};
use anyhow::{bail, Context, Result};

/// Fixed directed graph of intersections.
///
/// Intersections live in an arena and refer to each other by
/// `IntersectionIndex`; the graph never changes once built.
#[derive(Debug)]
pub struct Network {
    intersections: Vec<Intersection>,
}

impl Network {
    /// The four-intersection network the simulation runs on.
    ///
    /// ```text
    /// A --SN--> C     A --WE--> B
    /// B --SN--> D     B --EW--> A
    /// C --NS--> A     C --WE--> D
    /// D --NS--> B     D --EW--> C
    /// ```
    pub fn reference() -> Result<Self> {
        NetworkBuilder::new()
            .intersection('A')
            .intersection('B')
            .intersection('C')
            .intersection('D')
            .connect('A', Direction::SouthNorth, 'C')
            .connect('A', Direction::WestEast, 'B')
            .connect('B', Direction::SouthNorth, 'D')
            .connect('B', Direction::EastWest, 'A')
            .connect('C', Direction::NorthSouth, 'A')
            .connect('C', Direction::WestEast, 'D')
            .connect('D', Direction::NorthSouth, 'B')
            .connect('D', Direction::EastWest, 'C')
            .build()
    }

    pub fn len(&self) -> usize {
        self.intersections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intersections.is_empty()
    }

    pub fn get(&self, index: IntersectionIndex) -> Option<&Intersection> {
        self.intersections.get(index.0)
    }

    pub fn index_of(&self, id: IntersectionId) -> Option<IntersectionIndex> {
        self.intersections
            .iter()
            .position(|i| i.id == id)
            .map(IntersectionIndex)
    }

    pub fn indices(&self) -> impl Iterator<Item = IntersectionIndex> {
        (0..self.intersections.len()).map(IntersectionIndex)
    }

    pub fn iter(&self) -> impl Iterator<Item = (IntersectionIndex, &Intersection)> {
        self.intersections
            .iter()
            .enumerate()
            .map(|(i, intersection)| (IntersectionIndex(i), intersection))
    }

    /// Right-of-way query; an unknown index reads as closed.
    pub fn is_open(&self, index: IntersectionIndex, direction: Direction) -> bool {
        self.get(index)
            .map(|intersection| intersection.is_open(direction))
            .unwrap_or(false)
    }

    /// Successor of `index` when travelling in `direction`.
    pub fn next(&self, index: IntersectionIndex, direction: Direction) -> Option<IntersectionIndex> {
        self.get(index).and_then(|intersection| intersection.next(direction))
    }

    /// The phase each intersection starts in.
    pub fn initial_phase(index: IntersectionIndex) -> Phase {
        Phase::initial_for(index.0)
    }
}

/// Collects intersections and edges, then validates them into a `Network`.
#[derive(Debug, Default)]
pub struct NetworkBuilder {
    ids: Vec<char>,
    edges: Vec<(char, Direction, char)>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intersection(mut self, id: char) -> Self {
        self.ids.push(id);
        self
    }

    pub fn connect(mut self, from: char, direction: Direction, to: char) -> Self {
        self.edges.push((from, direction, to));
        self
    }

    pub fn build(self) -> Result<Network> {
        let mut intersections: Vec<Intersection> = Vec::with_capacity(self.ids.len());
        for (position, &id) in self.ids.iter().enumerate() {
            if intersections.iter().any(|i| i.id.0 == id) {
                bail!("Duplicate intersection id '{}'", id);
            }
            intersections.push(Intersection::new(
                IntersectionId(id),
                Phase::initial_for(position),
            ));
        }

        let position_of = |id: char| intersections.iter().position(|i| i.id.0 == id);
        let mut resolved = Vec::with_capacity(self.edges.len());
        for &(from, direction, to) in &self.edges {
            let from_index = position_of(from)
                .with_context(|| format!("Edge {} -{}-> {}: unknown source", from, direction, to))?;
            let to_index = position_of(to)
                .with_context(|| format!("Edge {} -{}-> {}: unknown target", from, direction, to))?;
            resolved.push((from_index, direction, to_index));
        }

        for (from_index, direction, to_index) in resolved {
            let from = &mut intersections[from_index];
            if from.next(direction).is_some() {
                bail!(
                    "Intersection '{}' already has an outgoing {} edge",
                    from.id,
                    direction
                );
            }
            from.connect(direction, IntersectionIndex(to_index));
        }

        Ok(Network { intersections })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(network: &Network, id: char) -> IntersectionIndex {
        network.index_of(IntersectionId(id)).unwrap()
    }

    #[test]
    fn reference_network_edges() {
        let network = Network::reference().unwrap();
        assert_eq!(network.len(), 4);

        let a = index(&network, 'A');
        let b = index(&network, 'B');
        let c = index(&network, 'C');
        let d = index(&network, 'D');

        assert_eq!(network.next(a, Direction::SouthNorth), Some(c));
        assert_eq!(network.next(a, Direction::WestEast), Some(b));
        assert_eq!(network.next(a, Direction::NorthSouth), None);
        assert_eq!(network.next(b, Direction::EastWest), Some(a));
        assert_eq!(network.next(c, Direction::WestEast), Some(d));
        assert_eq!(network.next(d, Direction::WestEast), None);
        assert_eq!(network.next(d, Direction::EastWest), Some(c));
    }

    #[test]
    fn reference_network_initial_phases_alternate() {
        let network = Network::reference().unwrap();
        let phases: Vec<_> = network
            .iter()
            .map(|(_, intersection)| intersection.signals().phase())
            .collect();
        assert_eq!(
            phases,
            vec![
                Some(Phase::NorthSouth),
                Some(Phase::EastWest),
                Some(Phase::NorthSouth),
                Some(Phase::EastWest),
            ]
        );
    }

    #[test]
    fn unknown_index_is_closed() {
        let network = Network::reference().unwrap();
        assert!(!network.is_open(IntersectionIndex(42), Direction::NorthSouth));
        assert_eq!(network.next(IntersectionIndex(42), Direction::NorthSouth), None);
    }

    #[test]
    fn builder_rejects_duplicates_and_unknown_ids() {
        let duplicate = NetworkBuilder::new().intersection('A').intersection('A').build();
        assert!(duplicate.is_err());

        let unknown = NetworkBuilder::new()
            .intersection('A')
            .connect('A', Direction::NorthSouth, 'Z')
            .build();
        let message = unknown.unwrap_err().to_string();
        assert!(message.contains("unknown target"), "{}", message);

        let double_edge = NetworkBuilder::new()
            .intersection('A')
            .intersection('B')
            .connect('A', Direction::NorthSouth, 'B')
            .connect('A', Direction::NorthSouth, 'A')
            .build();
        assert!(double_edge.is_err());
    }
}
