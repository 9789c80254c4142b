//! Named sums of potentials

use std::sync::Arc;

use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayViewMut1, ArrayViewMut2, ArrayViewMut3};

use super::{Potential, Times};
use crate::error::{ConfigError, Result};
use crate::math::Scalar;
use crate::units::{Dimension, UnitSystem};

/// `1/time²`, the dimension of a Hessian entry
const HESSIAN: Dimension = Dimension::new(0, -2, 0, 0);

/// A sum of named child potentials, evaluated in insertion order.
///
/// Every child shares the composite's dimensionality. A child in another
/// unit system is rebuilt in the composite's units when it is inserted. One
/// that cannot be rebuilt sees positions and times converted into its own
/// units, and its results are converted back before they are summed.
#[derive(Debug, Clone, Default)]
pub struct CompositePotential {
    units: UnitSystem,
    children: Vec<(String, Arc<dyn Potential>)>,
}

/// Scale factors between the composite's units and one child's
struct Conversion<'a> {
    from: &'a UnitSystem,
    to: &'a UnitSystem,
}

impl Conversion<'_> {
    fn inward(&self, dimension: Dimension) -> Scalar {
        self.from.conversion_factor(dimension, self.to)
    }

    fn outward(&self, dimension: Dimension) -> Scalar {
        self.to.conversion_factor(dimension, self.from)
    }
}

impl CompositePotential {
    pub fn new(units: UnitSystem) -> Self {
        Self {
            units,
            children: Vec::new(),
        }
    }

    /// Add a child under a unique name
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        potential: impl Potential + 'static,
    ) -> Result<()> {
        self.insert_shared(name, Arc::new(potential))
    }

    pub fn insert_shared(
        &mut self,
        name: impl Into<String>,
        potential: Arc<dyn Potential>,
    ) -> Result<()> {
        let name = name.into();
        if self.children.iter().any(|(existing, _)| *existing == name) {
            return Err(ConfigError::Shape(format!(
                "composite already has a component named '{name}'"
            ))
            .into());
        }
        if let Some((first, child)) = self.children.first() {
            if child.ndim() != potential.ndim() {
                return Err(ConfigError::Shape(format!(
                    "component '{name}' is {}-dimensional but '{first}' is {}-dimensional",
                    potential.ndim(),
                    child.ndim()
                ))
                .into());
            }
        }
        let potential = if self.conversion(potential.as_ref()).is_some() {
            potential.replace_units(&self.units)?.unwrap_or(potential)
        } else {
            potential
        };
        self.children.push((name, potential));
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(
        mut self,
        name: impl Into<String>,
        potential: impl Potential + 'static,
    ) -> Result<Self> {
        self.insert(name, potential)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Potential>> {
        self.children
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, p)| p)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Potential>)> {
        self.children.iter().map(|(name, p)| (name.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn conversion<'a>(&'a self, child: &'a dyn Potential) -> Option<Conversion<'a>> {
        let to = child.units();
        if to == &self.units || to.is_dimensionless() || self.units.is_dimensionless() {
            None
        } else {
            Some(Conversion {
                from: &self.units,
                to,
            })
        }
    }
}

impl Potential for CompositePotential {
    fn name(&self) -> &str {
        "composite"
    }

    /// Zero until the first child is inserted
    fn ndim(&self) -> usize {
        self.children.first().map_or(0, |(_, p)| p.ndim())
    }

    fn units(&self) -> &UnitSystem {
        &self.units
    }

    fn is_rotated(&self) -> bool {
        self.children.iter().any(|(_, p)| p.is_rotated())
    }

    fn add_energy(
        &self,
        q: ArrayView2<'_, Scalar>,
        t: &Times<'_>,
        mut out: ArrayViewMut1<'_, Scalar>,
    ) -> Result<()> {
        for (_, child) in &self.children {
            match self.conversion(child.as_ref()) {
                None => child.add_energy(q, t, out.view_mut())?,
                Some(c) => {
                    let qc = &q * c.inward(Dimension::LENGTH);
                    let tc = t.scaled(c.inward(Dimension::TIME));
                    let mut tmp = Array1::zeros(out.len());
                    child.add_energy(qc.view(), &tc, tmp.view_mut())?;
                    out.scaled_add(c.outward(Dimension::ENERGY), &tmp);
                }
            }
        }
        Ok(())
    }

    fn add_gradient(
        &self,
        q: ArrayView2<'_, Scalar>,
        t: &Times<'_>,
        mut out: ArrayViewMut2<'_, Scalar>,
    ) -> Result<()> {
        for (_, child) in &self.children {
            match self.conversion(child.as_ref()) {
                None => child.add_gradient(q, t, out.view_mut())?,
                Some(c) => {
                    let qc = &q * c.inward(Dimension::LENGTH);
                    let tc = t.scaled(c.inward(Dimension::TIME));
                    let mut tmp = Array2::zeros(out.raw_dim());
                    child.add_gradient(qc.view(), &tc, tmp.view_mut())?;
                    out.scaled_add(c.outward(Dimension::ACCELERATION), &tmp);
                }
            }
        }
        Ok(())
    }

    fn add_hessian(
        &self,
        q: ArrayView2<'_, Scalar>,
        t: &Times<'_>,
        mut out: ArrayViewMut3<'_, Scalar>,
    ) -> Result<()> {
        for (_, child) in &self.children {
            match self.conversion(child.as_ref()) {
                None => child.add_hessian(q, t, out.view_mut())?,
                Some(c) => {
                    let qc = &q * c.inward(Dimension::LENGTH);
                    let tc = t.scaled(c.inward(Dimension::TIME));
                    let mut tmp = Array3::zeros(out.raw_dim());
                    child.add_hessian(qc.view(), &tc, tmp.view_mut())?;
                    out.scaled_add(c.outward(HESSIAN), &tmp);
                }
            }
        }
        Ok(())
    }

    fn add_density(
        &self,
        q: ArrayView2<'_, Scalar>,
        t: &Times<'_>,
        mut out: ArrayViewMut1<'_, Scalar>,
    ) -> Result<()> {
        for (_, child) in &self.children {
            match self.conversion(child.as_ref()) {
                None => child.add_density(q, t, out.view_mut())?,
                Some(c) => {
                    let qc = &q * c.inward(Dimension::LENGTH);
                    let tc = t.scaled(c.inward(Dimension::TIME));
                    let mut tmp = Array1::zeros(out.len());
                    child.add_density(qc.view(), &tc, tmp.view_mut())?;
                    out.scaled_add(c.outward(Dimension::DENSITY), &tmp);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::potential::{HernquistPotential, KeplerPotential, PotentialExt};
    use crate::units::{KPC, MSUN};
    use approx::assert_relative_eq;

    fn kepler(m: Scalar) -> KeplerPotential {
        KeplerPotential::builder().parameter("m", m).build().unwrap()
    }

    #[test]
    fn test_duplicate_names_and_ndim_mismatch_rejected() {
        let mut composite = CompositePotential::default();
        composite.insert("point", kepler(1.0)).unwrap();
        assert!(composite.insert("point", kepler(2.0)).is_err());

        let hh = crate::potential::HenonHeilesPotential::builder()
            .build()
            .unwrap();
        assert!(composite.insert("hh", hh).is_err());
        assert_eq!(composite.len(), 1);
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let composite = CompositePotential::default()
            .with("b", kepler(1.0))
            .unwrap()
            .with("a", kepler(1.0))
            .unwrap();
        assert_eq!(composite.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(composite.get("a").is_some());
    }

    #[test]
    fn test_child_in_other_units_is_converted() {
        let galactic = UnitSystem::galactic();
        let solar = UnitSystem::solar_system();

        let disk_gal = HernquistPotential::builder()
            .parameter("m", 1.0e10 * MSUN)
            .parameter("c", 1.0 * KPC)
            .units(galactic.clone())
            .build()
            .unwrap();
        let disk_solar = HernquistPotential::builder()
            .parameter("m", 1.0e10 * MSUN)
            .parameter("c", 1.0 * KPC)
            .units(solar)
            .build()
            .unwrap();

        let composite = CompositePotential::new(galactic.clone())
            .with("disk", disk_solar.clone())
            .unwrap();
        assert_eq!(composite.get("disk").unwrap().units(), &galactic);

        // A nested composite cannot be rebuilt, so it is converted per call
        let nested = CompositePotential::new(galactic.clone())
            .with(
                "inner",
                CompositePotential::new(UnitSystem::solar_system())
                    .with("disk", disk_solar)
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(nested.get("inner").unwrap().units(), &UnitSystem::solar_system());

        let x = [2.0, 0.5, -0.3];
        assert_relative_eq!(
            composite.value_at(&x, 0.0).unwrap(),
            disk_gal.value_at(&x, 0.0).unwrap(),
            max_relative = 1e-9
        );
        assert_relative_eq!(
            nested.value_at(&x, 0.0).unwrap(),
            disk_gal.value_at(&x, 0.0).unwrap(),
            max_relative = 1e-9
        );
        let g1 = composite.gradient_at(&x, 0.0).unwrap();
        let g2 = disk_gal.gradient_at(&x, 0.0).unwrap();
        let g3 = nested.gradient_at(&x, 0.0).unwrap();
        for ((a, b), c) in g1.iter().zip(&g2).zip(&g3) {
            assert_relative_eq!(a, b, max_relative = 1e-9);
            assert_relative_eq!(c, b, max_relative = 1e-9);
        }
    }
}
