use super::tracker::{DomObstacles, Listeners};
use crate::config::Options;
use crate::driver::{clamp_opacity, FrameHandle, FrameScheduler, FrameSink, RenderLoop};
use crate::error::{RenderError, ShaderStage};
use crate::geometry;
use crate::shader::{self, ProgramKey};
use crate::simulation::Simulation;
use log::{error, info, warn};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{
    Document, HtmlCanvasElement, HtmlElement, WebGl2RenderingContext as GL, WebGlBuffer,
    WebGlProgram, WebGlShader, WebGlUniformLocation, Window,
};

/// Semi-transparent zinc wash laid over the balls.
const TINT_COLOR: &str = "rgba(63, 63, 70, 0.2)";
/// Marks the tint element so it can be found in the document.
const TINT_ATTRIBUTE: &str = "data-metaballs-tint";
const OPACITY_TRANSITION: &str = "opacity 300ms linear";

/// Holds the animation-frame closure. Kept in an `Option` so the closure can
/// be created after the scheduler and dropped on teardown.
type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut()>>>>;

pub(crate) fn host_error(e: JsValue) -> RenderError {
    RenderError::Host(format!("{:?}", e))
}

/// `requestAnimationFrame` scheduler owned by one session.
pub struct RafScheduler {
    window: Window,
    callback: FrameCallback,
}

impl FrameScheduler for RafScheduler {
    fn request_frame(&mut self) -> Result<FrameHandle, RenderError> {
        let callback = self.callback.borrow();
        let f = callback
            .as_ref()
            .ok_or_else(|| RenderError::Host("frame callback released".into()))?;
        self.window
            .request_animation_frame(f.as_ref().unchecked_ref())
            .map_err(host_error)
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if let Err(e) = self.window.cancel_animation_frame(handle) {
            warn!("cancelAnimationFrame failed: {:?}", e);
        }
    }
}

fn compile_shader(
    gl: &GL,
    stage: ShaderStage,
    source: &str,
) -> Result<WebGlShader, RenderError> {
    let kind = match stage {
        ShaderStage::Vertex => GL::VERTEX_SHADER,
        ShaderStage::Fragment => GL::FRAGMENT_SHADER,
    };
    let shader = gl
        .create_shader(kind)
        .ok_or(RenderError::Allocation("shader"))?;
    gl.shader_source(&shader, source);
    gl.compile_shader(&shader);

    if gl
        .get_shader_parameter(&shader, GL::COMPILE_STATUS)
        .as_bool()
        .unwrap_or(false)
    {
        Ok(shader)
    } else {
        let log = gl
            .get_shader_info_log(&shader)
            .unwrap_or_else(|| "unknown shader error".to_string());
        gl.delete_shader(Some(&shader));
        Err(RenderError::ShaderCompile { stage, log })
    }
}

fn link_program(
    gl: &GL,
    vertex: &WebGlShader,
    fragment: &WebGlShader,
) -> Result<WebGlProgram, RenderError> {
    let program = gl
        .create_program()
        .ok_or(RenderError::Allocation("GL program"))?;
    gl.attach_shader(&program, vertex);
    gl.attach_shader(&program, fragment);
    gl.link_program(&program);

    if gl
        .get_program_parameter(&program, GL::LINK_STATUS)
        .as_bool()
        .unwrap_or(false)
    {
        Ok(program)
    } else {
        let log = gl
            .get_program_info_log(&program)
            .unwrap_or_else(|| "unknown program error".to_string());
        gl.delete_program(Some(&program));
        Err(RenderError::ProgramLink(log))
    }
}

/// A compiled metaball program plus the quad it draws.
pub struct GlProgram {
    gl: GL,
    key: ProgramKey,
    program: WebGlProgram,
    vertex: WebGlShader,
    fragment: WebGlShader,
    quad: Option<WebGlBuffer>,
    metaballs: Option<WebGlUniformLocation>,
    mask_rects: Option<WebGlUniformLocation>,
    num_mask_rects: Option<WebGlUniformLocation>,
}

impl GlProgram {
    pub fn build(gl: &GL, key: ProgramKey) -> Result<Self, RenderError> {
        let vertex = compile_shader(gl, ShaderStage::Vertex, shader::VERTEX_SHADER_SRC)?;
        let fragment =
            match compile_shader(gl, ShaderStage::Fragment, &shader::fragment_shader_src(&key)) {
                Ok(f) => f,
                Err(e) => {
                    gl.delete_shader(Some(&vertex));
                    return Err(e);
                }
            };
        let program = match link_program(gl, &vertex, &fragment) {
            Ok(p) => p,
            Err(e) => {
                gl.delete_shader(Some(&vertex));
                gl.delete_shader(Some(&fragment));
                return Err(e);
            }
        };

        let mut built = Self {
            gl: gl.clone(),
            key,
            program,
            vertex,
            fragment,
            quad: None,
            metaballs: None,
            mask_rects: None,
            num_mask_rects: None,
        };
        if let Err(e) = built.bind_inputs() {
            built.release();
            return Err(e);
        }
        Ok(built)
    }

    fn bind_inputs(&mut self) -> Result<(), RenderError> {
        let gl = &self.gl;
        gl.use_program(Some(&self.program));

        let quad = gl
            .create_buffer()
            .ok_or(RenderError::Allocation("vertex buffer"))?;
        gl.bind_buffer(GL::ARRAY_BUFFER, Some(&quad));
        let vertices = js_sys::Float32Array::from(&shader::QUAD_VERTICES[..]);
        gl.buffer_data_with_array_buffer_view(GL::ARRAY_BUFFER, &vertices, GL::STATIC_DRAW);
        self.quad = Some(quad);

        let position = gl.get_attrib_location(&self.program, shader::POSITION_ATTRIBUTE);
        if position < 0 {
            return Err(RenderError::MissingAttribute(shader::POSITION_ATTRIBUTE));
        }
        gl.enable_vertex_attrib_array(position as u32);
        gl.vertex_attrib_pointer_with_i32(position as u32, 2, GL::FLOAT, false, 2 * 4, 0);

        let uniform = |name: &'static str| {
            gl.get_uniform_location(&self.program, name)
                .ok_or(RenderError::MissingUniform(name))
        };
        let metaballs = if self.key.count > 0 {
            Some(uniform(shader::METABALLS_UNIFORM)?)
        } else {
            None
        };
        let (mask_rects, num_mask_rects) = if self.key.mode.uses_mask() {
            (
                Some(uniform(shader::MASK_RECTS_UNIFORM)?),
                Some(uniform(shader::NUM_MASK_RECTS_UNIFORM)?),
            )
        } else {
            (None, None)
        };

        self.metaballs = metaballs;
        self.mask_rects = mask_rects;
        self.num_mask_rects = num_mask_rects;
        Ok(())
    }

    pub fn key(&self) -> ProgramKey {
        self.key
    }

    /// Delete every GL object this program owns.
    pub fn release(&self) {
        let gl = &self.gl;
        gl.delete_program(Some(&self.program));
        gl.delete_shader(Some(&self.vertex));
        gl.delete_shader(Some(&self.fragment));
        if let Some(quad) = &self.quad {
            gl.delete_buffer(Some(quad));
        }
    }
}

impl FrameSink for GlProgram {
    fn upload_metaballs(&mut self, data: &[f32]) {
        if let Some(loc) = &self.metaballs {
            self.gl.uniform3fv_with_f32_array(Some(loc), data);
        }
    }

    fn upload_mask(&mut self, rects: &[f32], count: i32) {
        if let Some(loc) = &self.mask_rects {
            self.gl.uniform4fv_with_f32_array(Some(loc), rects);
        }
        if let Some(loc) = &self.num_mask_rects {
            self.gl.uniform1i(Some(loc), count);
        }
    }

    fn draw(&mut self) {
        self.gl.draw_arrays(GL::TRIANGLE_STRIP, 0, 4);
    }
}

/// Size the canvas backing store to the viewport in device pixels.
fn fit_canvas(
    window: &Window,
    canvas: &HtmlCanvasElement,
    gl: &GL,
) -> Result<(u32, u32), RenderError> {
    let (inner_w, inner_h) = inner_size(window)?;
    let (w, h) = geometry::canvas_size(inner_w, inner_h, window.device_pixel_ratio());
    if canvas.width() != w || canvas.height() != h {
        canvas.set_width(w);
        canvas.set_height(h);
        let style = canvas.style();
        style
            .set_property("width", &format!("{}px", inner_w))
            .map_err(host_error)?;
        style
            .set_property("height", &format!("{}px", inner_h))
            .map_err(host_error)?;
        gl.viewport(0, 0, w as i32, h as i32);
    }
    Ok((w, h))
}

/// Fix `el` to the viewport, behind page content and out of hit testing.
fn pin_behind_content(el: &HtmlElement) -> Result<(), RenderError> {
    let style = el.style();
    for (name, value) in [
        ("position", "fixed"),
        ("inset", "0"),
        ("z-index", "-10"),
        ("pointer-events", "none"),
        ("transition", OPACITY_TRANSITION),
    ] {
        style.set_property(name, value).map_err(host_error)?;
    }
    Ok(())
}

/// Insert the tint layer right after `canvas`, so it paints above it.
fn insert_tint(
    document: &Document,
    canvas: &HtmlCanvasElement,
) -> Result<HtmlElement, RenderError> {
    let tint: HtmlElement = document
        .create_element("div")
        .map_err(host_error)?
        .dyn_into()
        .map_err(|_| RenderError::Host("div is not an HtmlElement".into()))?;
    tint.set_attribute("aria-hidden", "true").map_err(host_error)?;
    tint.set_attribute(TINT_ATTRIBUTE, "").map_err(host_error)?;
    pin_behind_content(&tint)?;
    tint.style()
        .set_property("background-color", TINT_COLOR)
        .map_err(host_error)?;

    match canvas.parent_node() {
        Some(parent) => parent.insert_before(&tint, canvas.next_sibling().as_ref()),
        None => document
            .body()
            .ok_or_else(|| RenderError::Host("no body".into()))?
            .append_child(&tint),
    }
    .map_err(host_error)?;
    Ok(tint)
}

fn apply_opacity(el: &HtmlElement, value: f64) {
    if let Err(e) = el
        .style()
        .set_property("opacity", &clamp_opacity(value).to_string())
    {
        warn!("could not set opacity: {:?}", e);
    }
}

pub(crate) fn inner_size(window: &Window) -> Result<(f64, f64), RenderError> {
    let w = window.inner_width().map_err(host_error)?.as_f64().unwrap_or(0.0);
    let h = window.inner_height().map_err(host_error)?.as_f64().unwrap_or(0.0);
    Ok((w, h))
}

fn seeded_rng() -> SmallRng {
    SmallRng::seed_from_u64((js_sys::Math::random() * u64::MAX as f64) as u64)
}

/// Everything one mounted canvas owns.
pub struct Session {
    window: Window,
    canvas: HtmlCanvasElement,
    gl: GL,
    options: Options,
    count: usize,
    program: GlProgram,
    tint: Option<HtmlElement>,
    driver: RenderLoop,
    scheduler: RafScheduler,
    obstacles: DomObstacles,
    listeners: Option<Listeners>,
    rng: SmallRng,
    halted: bool,
}

/// Set up a renderer on `canvas`. Returns `None` when WebGL2 is unavailable.
pub fn mount(
    canvas: HtmlCanvasElement,
    options: Options,
) -> Result<Option<Rc<RefCell<Session>>>, RenderError> {
    let window = web_sys::window().ok_or_else(|| RenderError::Host("no window".into()))?;
    let document = window
        .document()
        .ok_or_else(|| RenderError::Host("no document".into()))?;

    let gl: GL = match canvas.get_context("webgl2") {
        Ok(Some(ctx)) => ctx
            .dyn_into()
            .map_err(|_| RenderError::Host("webgl2 context has the wrong type".into()))?,
        Ok(None) | Err(_) => {
            warn!("WebGL2 not supported; metaball background disabled");
            return Ok(None);
        }
    };

    pin_behind_content(&canvas)?;
    apply_opacity(&canvas, options.opacity);

    let (width, height) = fit_canvas(&window, &canvas, &gl)?;
    let (inner_w, inner_h) = inner_size(&window)?;
    let count = options.particle_count(inner_w, inner_h);

    let mut rng = seeded_rng();
    let simulation = Simulation::new(&mut rng, count, width as f32, height as f32, options.speed());
    let key = ProgramKey { width, height, count, mode: options.mode };
    let program = GlProgram::build(&gl, key)?;
    let tint = match insert_tint(&document, &canvas) {
        Ok(tint) => tint,
        Err(e) => {
            program.release();
            return Err(e);
        }
    };
    apply_opacity(&tint, options.opacity);

    let mut driver = RenderLoop::new(simulation, options.mode, options.selectors(), options.opacity);
    let obstacles = DomObstacles::new(window.clone(), document.clone());
    driver.refresh_obstacles(&obstacles);

    let callback: FrameCallback = Rc::new(RefCell::new(None));
    let scheduler = RafScheduler { window: window.clone(), callback: callback.clone() };
    let mode = options.mode;

    let session = Rc::new(RefCell::new(Session {
        window: window.clone(),
        canvas,
        gl,
        options,
        count,
        program,
        tint: Some(tint),
        driver,
        scheduler,
        obstacles,
        listeners: None,
        rng,
        halted: false,
    }));

    let weak = Rc::downgrade(&session);
    *callback.borrow_mut() = Some(Closure::wrap(Box::new(move || {
        if let Some(session) = weak.upgrade() {
            session.borrow_mut().frame();
        }
    }) as Box<dyn FnMut()>));

    let attached = Listeners::attach(
        &window,
        &document,
        mode != shader::Mode::Plain,
        with_session(&session, |s| {
            if let Err(e) = s.handle_resize() {
                error!("metaball resize failed: {}", e);
                s.halt();
            }
        }),
        with_session(&session, Session::refresh_obstacles),
    );
    let listeners = match attached {
        Ok(listeners) => listeners,
        Err(e) => {
            session.borrow_mut().dispose();
            return Err(e);
        }
    };

    {
        let mut s = session.borrow_mut();
        s.listeners = Some(listeners);
        s.resume();
    }
    info!("metaballs mounted: {}x{}, {} balls, {:?} mode", width, height, count, mode);
    Ok(Some(session))
}

/// Wrap a session method as a listener callback holding only a weak
/// reference.
fn with_session<F>(session: &Rc<RefCell<Session>>, f: F) -> Rc<dyn Fn()>
where
    F: Fn(&mut Session) + 'static,
{
    let weak: Weak<RefCell<Session>> = Rc::downgrade(session);
    Rc::new(move || {
        if let Some(session) = weak.upgrade() {
            if let Ok(mut s) = session.try_borrow_mut() {
                f(&mut s);
            }
        }
    })
}

impl Session {
    fn frame(&mut self) {
        let Session { driver, program, scheduler, .. } = self;
        if let Err(e) = driver.tick(program, scheduler) {
            error!("metaball frame failed: {}", e);
        }
    }

    fn resume(&mut self) {
        if self.halted {
            return;
        }
        if let Err(e) = self.driver.start(&mut self.scheduler) {
            error!("could not schedule metaball frame: {}", e);
        }
    }

    /// Stop for good after a fatal error.
    fn halt(&mut self) {
        self.halted = true;
        self.driver.stop(&mut self.scheduler);
    }

    pub fn is_running(&self) -> bool {
        self.driver.is_running()
    }

    pub fn set_opacity(&mut self, value: f64) {
        apply_opacity(&self.canvas, value);
        if let Some(tint) = &self.tint {
            apply_opacity(tint, value);
        }
        if self.halted {
            return;
        }
        if let Err(e) = self.driver.set_opacity(value, &mut self.scheduler) {
            error!("could not schedule metaball frame: {}", e);
        }
    }

    pub fn refresh_obstacles(&mut self) {
        self.driver.refresh_obstacles(&self.obstacles);
    }

    /// Track the viewport size. A new size bakes new constants into the
    /// shader, so program and simulation are rebuilt together.
    fn handle_resize(&mut self) -> Result<(), RenderError> {
        if self.halted {
            return Ok(());
        }
        let (width, height) = fit_canvas(&self.window, &self.canvas, &self.gl)?;
        let next = ProgramKey { width, height, count: self.count, mode: self.options.mode };
        let current = self.program.key();

        let Session { gl, program, driver, scheduler, rng, options, .. } = self;
        let rebuilt = driver.rekey(&current, next, options.speed(), rng, scheduler, |key| {
            let built = GlProgram::build(gl, key)?;
            std::mem::replace(program, built).release();
            Ok(())
        })?;
        if rebuilt {
            info!("metaballs rebuilt for {}x{}", width, height);
        }
        self.refresh_obstacles();
        Ok(())
    }

    /// Cancel the pending frame, detach listeners and free GL objects.
    pub fn dispose(&mut self) {
        self.driver.stop(&mut self.scheduler);
        self.halted = true;
        self.scheduler.callback.borrow_mut().take();
        self.listeners.take();
        if let Some(tint) = self.tint.take() {
            tint.remove();
        }
        self.program.release();
        info!("metaballs disposed");
    }
}
