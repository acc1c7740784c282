use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use glam::Vec3;
use serde::Deserialize;
use worldstream_common::{PropertyBag, SplineTable};
use worldstream_stream::{
    Behaviour, GfxHandle, GraphicsContext, GridIndex, HookError, LoadRequest, LoaderOptions, ObjectDesc,
    ObjectRef, PhysicsContext, PhysicsHandle, Streamer, StreamerConfig, ThreadPoolLoader,
};

pub const DEMO: &str = include_str!("../scenarios/demo.yaml");

/// A streaming scenario: world contents plus a camera path.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub streamer: StreamerConfig,
    #[serde(default = "default_cell_size")]
    pub cell_size: f32,
    #[serde(default)]
    pub loader: LoaderSection,
    pub classes: Vec<ClassDef>,
    pub objects: Vec<ObjectDef>,
    #[serde(default)]
    pub links: Vec<LinkDef>,
    /// Waypoints, visited in order over the run.
    pub camera: Vec<Vec3>,
}

fn default_cell_size() -> f32 {
    32.0
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderSection {
    pub max_in_flight: Option<usize>,
    pub resident_budget: Option<usize>,
    /// Simulated preparation time per resource.
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassDef {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub properties: PropertyBag,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectDef {
    #[serde(default)]
    pub name: String,
    pub class: String,
    pub position: Vec3,
    #[serde(default)]
    pub properties: PropertyBag,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkDef {
    pub far: String,
    pub near: String,
}

impl Scenario {
    /// Read a scenario from YAML, or JSON when the extension says so.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        let is_json = path.extension().is_some_and(|e| e == "json");
        let scenario = if is_json {
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))?
        };
        Ok(scenario)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let scenario: Self = serde_yaml::from_str(text)?;
        if scenario.camera.is_empty() {
            bail!("scenario needs at least one camera waypoint");
        }
        Ok(scenario)
    }

    pub fn demo() -> anyhow::Result<Self> {
        Self::from_yaml(DEMO)
    }

    /// Build a configured streamer holding the scenario's classes, objects
    /// and links.
    pub fn build(&self, events: &EventLog) -> anyhow::Result<Streamer> {
        let options = LoaderOptions {
            max_in_flight: self
                .loader
                .max_in_flight
                .unwrap_or(LoaderOptions::default().max_in_flight),
            resident_budget: self.loader.resident_budget,
        };
        let latency = Duration::from_millis(self.loader.latency_ms);
        let loader = ThreadPoolLoader::new(
            options,
            Arc::new(move |request: &LoadRequest| {
                std::thread::sleep(latency * request.resources.len() as u32);
                Ok(())
            }),
        );
        let mut streamer = Streamer::new(
            self.streamer.clone(),
            Box::new(GridIndex::new(self.cell_size)),
            Box::new(loader),
        )?;
        streamer.set_gfx(Rc::new(ConsoleGfx));
        streamer.set_physics(Rc::new(ConsolePhysics));

        for def in &self.classes {
            let parent = match &def.parent {
                Some(name) => Some(streamer.get_class(name)?),
                None => None,
            };
            let transient = def
                .properties
                .get_bool("transient")
                .or_else(|| parent.as_ref()?.properties().get_bool("transient"))
                .unwrap_or(false);
            let behaviour = Rc::new(Narrator {
                transient,
                events: events.clone(),
            });
            streamer.add_class(&def.name, parent.as_ref(), def.properties.clone(), behaviour)?;
        }

        for def in &self.objects {
            let class = streamer.get_class(&def.class)?;
            let mut desc = ObjectDesc::new(def.name.clone(), def.position);
            desc.properties = def.properties.clone();
            streamer.add_object(&class, desc)?;
        }

        for link in &self.links {
            let far = streamer.get_object(&link.far)?;
            let near = streamer.get_object(&link.near)?;
            streamer.set_near(&far, Some(&near))?;
        }
        Ok(streamer)
    }

    /// Smooth camera path through the waypoints, one spline per axis,
    /// parameterised over `[0, 1]`.
    pub fn camera_path(&self) -> CameraPath {
        let n = self.camera.len();
        let t = |i: usize| if n > 1 { i as f32 / (n - 1) as f32 } else { 0.0 };
        let axis = |f: fn(&Vec3) -> f32| {
            SplineTable::from_points(self.camera.iter().enumerate().map(|(i, p)| (t(i), f(p))))
        };
        CameraPath {
            x: axis(|p| p.x),
            y: axis(|p| p.y),
            z: axis(|p| p.z),
        }
    }
}

pub struct CameraPath {
    x: SplineTable<f32>,
    y: SplineTable<f32>,
    z: SplineTable<f32>,
}

impl CameraPath {
    pub fn at(&self, t: f32) -> Vec3 {
        let t = t.clamp(0.0, 1.0);
        Vec3::new(self.x.evaluate(t), self.y.evaluate(t), self.z.evaluate(t))
    }
}

struct ConsoleGfx;

impl GraphicsContext for ConsoleGfx {
    fn label(&self) -> &str {
        "console"
    }
}

struct ConsolePhysics;

impl PhysicsContext for ConsolePhysics {
    fn label(&self) -> &str {
        "console"
    }
}

/// Lifecycle event counts gathered by [`Narrator`].
#[derive(Debug, Clone, Default)]
pub struct EventLog(Rc<RefCell<HashMap<&'static str, usize>>>);

impl EventLog {
    fn bump(&self, event: &'static str) {
        *self.0.borrow_mut().entry(event).or_default() += 1;
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.borrow().get(event).copied().unwrap_or(0)
    }
}

/// Behaviour that logs every lifecycle hook. Transient objects ask to be
/// destroyed when they leave view and stop ticking after their first frame.
struct Narrator {
    transient: bool,
    events: EventLog,
}

impl Behaviour for Narrator {
    fn activate(
        &self,
        _streamer: &mut Streamer,
        obj: &ObjectRef,
        gfx: &GfxHandle,
        physics: &PhysicsHandle,
    ) -> Result<(), HookError> {
        self.events.bump("activate");
        tracing::info!(
            object = obj.name(),
            gfx = gfx.label(),
            physics = physics.label(),
            "activated"
        );
        Ok(())
    }

    fn deactivate(&self, _streamer: &mut Streamer, obj: &ObjectRef) -> Result<bool, HookError> {
        self.events.bump("deactivate");
        tracing::info!(object = obj.name(), transient = self.transient, "deactivated");
        Ok(self.transient)
    }

    fn frame(&self, _streamer: &mut Streamer, obj: &ObjectRef, elapsed: f32) -> Result<bool, HookError> {
        self.events.bump("frame");
        tracing::trace!(object = obj.name(), elapsed, "tick");
        Ok(!self.transient)
    }

    fn range_changed(
        &self,
        _streamer: &mut Streamer,
        obj: &ObjectRef,
        range2: f32,
        fade: f32,
    ) -> Result<(), HookError> {
        tracing::trace!(object = obj.name(), range2, fade, "range");
        Ok(())
    }

    fn destroy(&self, _streamer: &mut Streamer, obj: &ObjectRef) -> Result<(), HookError> {
        self.events.bump("destroy");
        tracing::debug!(object = obj.name(), "destroyed");
        Ok(())
    }
}
