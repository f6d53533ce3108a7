//! Material property registry.
//!
//! Maps a [`SurfaceType`] to the physical constants the penetration, ricochet
//! and wound-cavity models consume. The registry is built once, then frozen
//! behind an `Arc` and shared read-only with the simulation worker.

use std::collections::HashMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::physics::units::{g_cm3_to_kg_m3, PA_PER_GPA, PA_PER_MPA};

/// Identifies the kind of surface a world query reported.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Reflect, Serialize, Deserialize,
)]
pub enum SurfaceType {
    /// No surface information; resolved to the registry's fallback material.
    #[default]
    Default,
    Acrylic,
    Aluminum,
    Asphalt,
    Bone,
    Brass,
    Brick,
    CarbonFiber,
    CastIron,
    Ceramic,
    Concrete,
    Copper,
    Drywall,
    Flesh,
    Glass,
    HardenedSteel,
    HardPlastic,
    Hardwood,
    Ice,
    Kevlar,
    Lead,
    Limestone,
    Paper,
    Plastic,
    Polystyrene,
    Rubber,
    Softwood,
    Steel,
    Titanium,
    TungstenCarbide,
    Water,
    /// Host-defined surface registered through [`MaterialRegistry::insert`].
    Custom(u16),
}

/// Which penetration model a material uses.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Default, Reflect, Serialize, Deserialize,
)]
pub enum PenetrationComplexity {
    /// Threshold model driven by [`SimplePenetrationProperties`].
    Simplified,
    /// Stress/fracture model driven by the elastic and strength constants.
    #[default]
    Complex,
}

/// What a projectile must exceed to get through a simplified material.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Default, Reflect, Serialize, Deserialize,
)]
pub enum PenetrationRequirement {
    /// Projectile penetration value must reach the material resistance.
    ResistanceThreshold,
    /// Kinetic energy must reach the energy requirement.
    EnergyThreshold,
    /// Both thresholds must be met.
    #[default]
    Both,
}

/// Parameters of the simplified (threshold) penetration model.
#[derive(Clone, Copy, Debug, PartialEq, Reflect, Serialize, Deserialize)]
pub struct SimplePenetrationProperties {
    /// Penetration value a projectile needs to pass.
    pub penetration_resistance: f32,
    /// Which thresholds apply.
    pub requirement: PenetrationRequirement,
    /// Energy lost per centimeter of material (J).
    pub energy_loss_per_cm: f32,
    /// Kinetic energy needed to penetrate at all (J).
    pub energy_required: f32,
}

impl Default for SimplePenetrationProperties {
    fn default() -> Self {
        Self {
            penetration_resistance: 1.0,
            requirement: PenetrationRequirement::Both,
            energy_loss_per_cm: 100.0,
            energy_required: 100.0,
        }
    }
}

/// Material-level ricochet policy.
///
/// Angles are in degrees measured from the surface plane.
#[derive(Clone, Copy, Debug, PartialEq, Reflect, Serialize, Deserialize)]
pub struct RicochetProperties {
    /// When false, nothing ricochets off this material.
    pub allow_ricochet: bool,
    /// Optional hard cap on the computed critical angle.
    pub limit_angle: Option<f32>,
    /// Draw against the computed likelihood instead of treating any non-zero
    /// likelihood as a ricochet.
    pub add_randomness: bool,
    /// When true, `probability` alone decides; energy and angle tests are skipped.
    pub probability_overrides_calculation: bool,
    /// Angle past which a ricochet never happens.
    pub cutoff_angle: f32,
    /// Probability used when `probability_overrides_calculation` is set.
    pub probability: f32,
}

impl Default for RicochetProperties {
    fn default() -> Self {
        Self {
            allow_ricochet: true,
            limit_angle: None,
            add_randomness: true,
            probability_overrides_calculation: false,
            cutoff_angle: 80.0,
            probability: 1.0,
        }
    }
}

/// Physical constants of a surface material.
///
/// Units: density g/cm³, strengths MPa, Young's modulus GPa, fracture toughness
/// MPa·m½, viscosity Pa·s. Use the `*_si` accessors inside physics code.
#[derive(Clone, Debug, PartialEq, Reflect, Serialize, Deserialize)]
pub struct MaterialProperties {
    pub name: String,
    pub surface: SurfaceType,
    pub density: f32,
    pub youngs_modulus: f32,
    pub poissons_ratio: f32,
    pub ultimate_tensile_strength: f32,
    pub yield_strength: f32,
    pub compressive_strength: f32,
    pub shear_strength: f32,
    pub fracture_toughness: f32,
    pub friction: f32,
    pub viscosity: f32,
    /// Multiplier applied to strength under ballistic strain rates.
    pub strain_rate_factor: f32,
    /// Scales every resistive term of the penetration models.
    pub penetration_resistance_multiplier: f32,
    pub ricochet: RicochetProperties,
    pub use_custom_ricochet: bool,
    pub is_fluid: bool,
    pub complexity: PenetrationComplexity,
    pub simple: SimplePenetrationProperties,
}

impl Default for MaterialProperties {
    fn default() -> Self {
        Self {
            name: String::new(),
            surface: SurfaceType::Default,
            density: 0.0,
            youngs_modulus: 0.0,
            poissons_ratio: 0.0,
            ultimate_tensile_strength: 0.0,
            yield_strength: 0.0,
            compressive_strength: 0.0,
            shear_strength: 0.0,
            fracture_toughness: 0.0,
            friction: 0.2,
            viscosity: 0.0,
            strain_rate_factor: 1.5,
            penetration_resistance_multiplier: 1.0,
            ricochet: RicochetProperties::default(),
            use_custom_ricochet: false,
            is_fluid: false,
            complexity: PenetrationComplexity::Complex,
            simple: SimplePenetrationProperties::default(),
        }
    }
}

impl MaterialProperties {
    /// Creates a solid material from its principal constants.
    ///
    /// Yield strength is derived as `UTS / (1 + ν / 3)`.
    ///
    /// # Arguments
    /// * `name` - Display name; an empty name marks the material invalid
    /// * `surface` - Surface type this material is registered under
    /// * `density` - g/cm³
    /// * `youngs_modulus` - GPa
    /// * `poissons_ratio` - dimensionless
    /// * `ultimate_tensile_strength` - MPa
    /// * `compressive_strength` - MPa
    /// * `shear_strength` - MPa
    /// * `fracture_toughness` - MPa·m½
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        surface: SurfaceType,
        density: f32,
        youngs_modulus: f32,
        poissons_ratio: f32,
        ultimate_tensile_strength: f32,
        compressive_strength: f32,
        shear_strength: f32,
        fracture_toughness: f32,
    ) -> Self {
        Self {
            name: name.into(),
            surface,
            density,
            youngs_modulus,
            poissons_ratio,
            ultimate_tensile_strength,
            yield_strength: ultimate_tensile_strength / (1.0 + poissons_ratio / 3.0),
            compressive_strength,
            shear_strength,
            fracture_toughness,
            ..Default::default()
        }
    }

    /// Switches the material to the simplified penetration model.
    pub fn with_simple(mut self, simple: SimplePenetrationProperties) -> Self {
        self.complexity = PenetrationComplexity::Simplified;
        self.simple = simple;
        self
    }

    /// Installs a custom ricochet policy.
    pub fn with_ricochet(mut self, ricochet: RicochetProperties) -> Self {
        self.ricochet = ricochet;
        self.use_custom_ricochet = true;
        self
    }

    /// Marks the material as a fluid with the given viscosity (Pa·s).
    pub fn as_fluid(mut self, viscosity: f32) -> Self {
        self.is_fluid = true;
        self.viscosity = viscosity;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_resistance_multiplier(mut self, multiplier: f32) -> Self {
        self.penetration_resistance_multiplier = multiplier;
        self
    }

    /// A material is usable once it has a name and positive density.
    ///
    /// Solids additionally need a positive Young's modulus.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
            && self.density > 0.0
            && (self.is_fluid || self.youngs_modulus > 0.0)
    }

    pub fn is_flesh(&self) -> bool {
        self.surface == SurfaceType::Flesh
    }

    pub fn is_bone(&self) -> bool {
        self.surface == SurfaceType::Bone
    }

    pub fn is_flesh_or_bone(&self) -> bool {
        self.is_flesh() || self.is_bone()
    }

    /// Density in kg/m³.
    pub fn density_si(&self) -> f32 {
        g_cm3_to_kg_m3(self.density)
    }

    /// Young's modulus in Pa.
    pub fn youngs_modulus_si(&self) -> f32 {
        self.youngs_modulus * PA_PER_GPA
    }

    /// Yield strength in Pa, not rate-adjusted.
    pub fn yield_strength_si(&self) -> f32 {
        self.yield_strength * PA_PER_MPA
    }

    pub fn compressive_strength_si(&self) -> f32 {
        self.compressive_strength * PA_PER_MPA
    }

    /// Fracture toughness in Pa·m½.
    pub fn fracture_toughness_si(&self) -> f32 {
        self.fracture_toughness * PA_PER_MPA
    }

    /// Yield strength under ballistic strain rates (Pa).
    pub fn dynamic_yield_si(&self) -> f32 {
        self.yield_strength_si() * self.strain_rate_factor.max(1.0)
    }

    /// Critical energy release rate `K_IC² / E` (J/m²).
    pub fn critical_energy_release_rate(&self) -> f32 {
        let e = self.youngs_modulus_si();
        if e <= 0.0 {
            return 0.0;
        }
        let k = self.fracture_toughness_si();
        k * k / e
    }
}

/// Lookup table from surface type to material constants.
///
/// Unknown surfaces resolve to the fallback material so that a simulation never
/// runs against uninitialized constants.
#[derive(Clone, Debug)]
pub struct MaterialRegistry {
    materials: HashMap<SurfaceType, MaterialProperties>,
    fallback: MaterialProperties,
}

impl Default for MaterialRegistry {
    fn default() -> Self {
        Self::with_presets()
    }
}

impl MaterialRegistry {
    /// Creates an empty registry that resolves everything to `fallback`.
    pub fn new(fallback: MaterialProperties) -> Self {
        Self {
            materials: HashMap::new(),
            fallback,
        }
    }

    /// Creates a registry holding every preset, with concrete as the fallback.
    pub fn with_presets() -> Self {
        let mut registry = Self::new(presets::concrete());
        for material in presets::all() {
            registry.insert(material);
        }
        registry
    }

    /// Registers (or replaces) a material under its own surface type.
    ///
    /// Invalid materials are rejected with a warning.
    pub fn insert(&mut self, material: MaterialProperties) -> bool {
        if !material.is_valid() {
            warn!("Rejecting invalid material '{}'", material.name);
            return false;
        }
        self.materials.insert(material.surface, material);
        true
    }

    /// Replaces the fallback material used for unknown surfaces.
    pub fn set_fallback(&mut self, surface: SurfaceType) -> bool {
        match self.materials.get(&surface) {
            Some(material) => {
                self.fallback = material.clone();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, surface: SurfaceType) -> Option<&MaterialProperties> {
        self.materials.get(&surface)
    }

    /// Resolves a surface, falling back to the default material.
    pub fn resolve(&self, surface: SurfaceType) -> &MaterialProperties {
        self.materials.get(&surface).unwrap_or(&self.fallback)
    }

    pub fn fallback(&self) -> &MaterialProperties {
        &self.fallback
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MaterialProperties> {
        self.materials.values()
    }
}

/// Material presets for common surfaces.
///
/// Values are representative engineering constants; hosts tune them through
/// [`MaterialRegistry::insert`].
pub mod presets {
    use super::*;

    pub fn acrylic() -> MaterialProperties {
        MaterialProperties::new("Acrylic", SurfaceType::Acrylic, 1.18, 3.2, 0.37, 70.0, 120.0, 60.0, 1.0)
    }

    pub fn aluminum() -> MaterialProperties {
        MaterialProperties::new("Aluminum", SurfaceType::Aluminum, 2.70, 69.0, 0.33, 310.0, 310.0, 207.0, 29.0)
    }

    pub fn asphalt() -> MaterialProperties {
        MaterialProperties::new("Asphalt", SurfaceType::Asphalt, 2.36, 3.0, 0.35, 2.0, 8.0, 1.5, 0.3)
            .with_friction(0.6)
    }

    /// Cortical bone. Hit-zone surfaces made of bone may still ricochet.
    pub fn bone() -> MaterialProperties {
        MaterialProperties::new("Bone", SurfaceType::Bone, 1.9, 17.0, 0.3, 130.0, 190.0, 70.0, 5.0)
    }

    pub fn brass() -> MaterialProperties {
        MaterialProperties::new("Brass", SurfaceType::Brass, 8.5, 100.0, 0.34, 350.0, 350.0, 250.0, 40.0)
    }

    pub fn brick() -> MaterialProperties {
        MaterialProperties::new("Brick", SurfaceType::Brick, 1.9, 15.0, 0.2, 3.5, 20.0, 5.0, 0.8)
            .with_friction(0.5)
    }

    pub fn carbon_fiber() -> MaterialProperties {
        MaterialProperties::new("CarbonFiber", SurfaceType::CarbonFiber, 1.6, 70.0, 0.3, 600.0, 570.0, 90.0, 40.0)
    }

    pub fn cast_iron() -> MaterialProperties {
        MaterialProperties::new("CastIron", SurfaceType::CastIron, 7.2, 110.0, 0.26, 200.0, 600.0, 240.0, 20.0)
    }

    pub fn ceramic() -> MaterialProperties {
        MaterialProperties::new("Ceramic", SurfaceType::Ceramic, 3.9, 370.0, 0.22, 300.0, 2500.0, 330.0, 4.0)
    }

    /// Structural concrete. Also the registry's default fallback.
    pub fn concrete() -> MaterialProperties {
        MaterialProperties::new("Concrete", SurfaceType::Concrete, 2.4, 30.0, 0.2, 3.0, 30.0, 6.0, 1.0)
            .with_friction(0.5)
    }

    pub fn copper() -> MaterialProperties {
        MaterialProperties::new("Copper", SurfaceType::Copper, 8.96, 117.0, 0.34, 220.0, 220.0, 150.0, 60.0)
    }

    pub fn drywall() -> MaterialProperties {
        MaterialProperties::new("Drywall", SurfaceType::Drywall, 0.7, 2.0, 0.3, 1.5, 3.0, 1.0, 0.2)
    }

    /// Soft tissue. Ricochet is disabled outright.
    pub fn flesh() -> MaterialProperties {
        MaterialProperties::new("Flesh", SurfaceType::Flesh, 1.06, 0.0005, 0.45, 1.0, 1.0, 0.5, 0.1)
            .with_ricochet(RicochetProperties {
                allow_ricochet: false,
                ..Default::default()
            })
    }

    pub fn glass() -> MaterialProperties {
        MaterialProperties::new("Glass", SurfaceType::Glass, 2.5, 70.0, 0.22, 45.0, 1000.0, 30.0, 0.75)
            .with_friction(0.1)
    }

    /// Armor-grade steel.
    pub fn hardened_steel() -> MaterialProperties {
        MaterialProperties::new("HardenedSteel", SurfaceType::HardenedSteel, 7.85, 205.0, 0.29, 1800.0, 1800.0, 1100.0, 50.0)
    }

    pub fn hard_plastic() -> MaterialProperties {
        MaterialProperties::new("HardPlastic", SurfaceType::HardPlastic, 1.2, 2.4, 0.37, 60.0, 80.0, 50.0, 2.5)
    }

    pub fn hardwood() -> MaterialProperties {
        MaterialProperties::new("Hardwood", SurfaceType::Hardwood, 0.75, 12.0, 0.3, 100.0, 50.0, 12.0, 5.0)
            .with_friction(0.4)
    }

    pub fn ice() -> MaterialProperties {
        MaterialProperties::new("Ice", SurfaceType::Ice, 0.917, 9.0, 0.33, 1.0, 5.0, 0.7, 0.1)
            .with_friction(0.05)
    }

    pub fn kevlar() -> MaterialProperties {
        MaterialProperties::new("Kevlar", SurfaceType::Kevlar, 1.44, 70.0, 0.36, 3000.0, 300.0, 40.0, 30.0)
    }

    pub fn lead() -> MaterialProperties {
        MaterialProperties::new("Lead", SurfaceType::Lead, 11.34, 16.0, 0.44, 17.0, 17.0, 10.0, 15.0)
    }

    pub fn limestone() -> MaterialProperties {
        MaterialProperties::new("Limestone", SurfaceType::Limestone, 2.6, 50.0, 0.25, 6.0, 100.0, 10.0, 1.0)
    }

    pub fn paper() -> MaterialProperties {
        MaterialProperties::new("Paper", SurfaceType::Paper, 0.8, 4.0, 0.3, 40.0, 5.0, 2.0, 2.0)
    }

    pub fn plastic() -> MaterialProperties {
        MaterialProperties::new("Plastic", SurfaceType::Plastic, 0.95, 1.0, 0.42, 25.0, 25.0, 20.0, 2.0)
    }

    /// Expanded foam. Too weak for the stress model, so it uses the
    /// simplified threshold model.
    pub fn polystyrene() -> MaterialProperties {
        MaterialProperties::new("Polystyrene", SurfaceType::Polystyrene, 0.05, 0.005, 0.1, 0.4, 0.3, 0.2, 0.05)
            .with_simple(SimplePenetrationProperties {
                penetration_resistance: 1.0,
                requirement: PenetrationRequirement::ResistanceThreshold,
                energy_loss_per_cm: 80.0,
                energy_required: 1.0,
            })
    }

    pub fn rubber() -> MaterialProperties {
        MaterialProperties::new("Rubber", SurfaceType::Rubber, 1.1, 0.05, 0.49, 15.0, 10.0, 5.0, 1.0)
            .with_friction(0.9)
    }

    pub fn softwood() -> MaterialProperties {
        MaterialProperties::new("Softwood", SurfaceType::Softwood, 0.5, 9.0, 0.3, 40.0, 30.0, 7.0, 0.5)
            .with_friction(0.4)
    }

    /// Mild structural steel.
    pub fn steel() -> MaterialProperties {
        MaterialProperties::new("Steel", SurfaceType::Steel, 7.85, 200.0, 0.29, 500.0, 500.0, 350.0, 50.0)
    }

    pub fn titanium() -> MaterialProperties {
        MaterialProperties::new("Titanium", SurfaceType::Titanium, 4.43, 114.0, 0.34, 950.0, 970.0, 550.0, 75.0)
    }

    pub fn tungsten_carbide() -> MaterialProperties {
        MaterialProperties::new("TungstenCarbide", SurfaceType::TungstenCarbide, 15.6, 600.0, 0.24, 350.0, 5000.0, 300.0, 10.0)
    }

    /// Fresh water. Penetrated with the fluid drag model.
    pub fn water() -> MaterialProperties {
        MaterialProperties {
            name: "Water".into(),
            surface: SurfaceType::Water,
            density: 1.0,
            poissons_ratio: 0.5,
            friction: 0.0,
            ..Default::default()
        }
        .as_fluid(0.001)
    }

    /// Every preset material.
    pub fn all() -> Vec<MaterialProperties> {
        vec![
            acrylic(),
            aluminum(),
            asphalt(),
            bone(),
            brass(),
            brick(),
            carbon_fiber(),
            cast_iron(),
            ceramic(),
            concrete(),
            copper(),
            drywall(),
            flesh(),
            glass(),
            hardened_steel(),
            hard_plastic(),
            hardwood(),
            ice(),
            kevlar(),
            lead(),
            limestone(),
            paper(),
            plastic(),
            polystyrene(),
            rubber(),
            softwood(),
            steel(),
            titanium(),
            tungsten_carbide(),
            water(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid_and_unique() {
        let all = presets::all();
        assert_eq!(all.len(), 30);
        for material in &all {
            assert!(material.is_valid(), "{} should be valid", material.name);
        }
        let registry = MaterialRegistry::with_presets();
        assert_eq!(registry.len(), all.len());
    }

    #[test]
    fn test_yield_is_derived_from_uts() {
        let steel = presets::steel();
        let expected = 500.0 / (1.0 + 0.29 / 3.0);
        assert!((steel.yield_strength - expected).abs() < 1e-3);
        assert!(steel.dynamic_yield_si() > steel.yield_strength_si());
    }

    #[test]
    fn test_unknown_surface_resolves_to_fallback() {
        let registry = MaterialRegistry::with_presets();
        assert_eq!(registry.resolve(SurfaceType::Custom(7)).surface, SurfaceType::Concrete);
        assert_eq!(registry.resolve(SurfaceType::Steel).surface, SurfaceType::Steel);
    }

    #[test]
    fn test_invalid_material_rejected() {
        let mut registry = MaterialRegistry::with_presets();
        let unnamed = MaterialProperties::default();
        assert!(!unnamed.is_valid());
        assert!(!registry.insert(unnamed));
    }

    #[test]
    fn test_flesh_and_bone_helpers() {
        assert!(presets::flesh().is_flesh());
        assert!(presets::bone().is_bone());
        assert!(!presets::steel().is_flesh_or_bone());
    }
}
