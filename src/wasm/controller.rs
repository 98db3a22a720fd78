//! Handles exported to the host page.

use super::render::{self, Session};
use crate::config::Options;
use crate::geometry;
use log::warn;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use wasm_bindgen::prelude::*;
use web_sys::{HtmlCanvasElement, Window};

/// A metaball background mounted on one canvas.
#[wasm_bindgen]
pub struct MetaBalls {
    session: Option<Rc<RefCell<Session>>>,
}

#[wasm_bindgen]
impl MetaBalls {
    /// Mount on `canvas`. Without WebGL2 the handle is inert instead of
    /// throwing; shader or link failures throw with the driver log.
    #[wasm_bindgen(constructor)]
    pub fn new(canvas: HtmlCanvasElement, options: JsValue) -> Result<MetaBalls, JsValue> {
        let options = Options::from_js(options)?;
        let session = render::mount(canvas, options)?;
        Ok(MetaBalls { session })
    }

    #[wasm_bindgen(js_name = setOpacity)]
    pub fn set_opacity(&self, value: f64) {
        if let Some(session) = &self.session {
            session.borrow_mut().set_opacity(value);
        }
    }

    /// Re-query obstacle rects now, e.g. after a layout change the observers
    /// cannot see.
    #[wasm_bindgen(js_name = refreshObstacles)]
    pub fn refresh_obstacles(&self) {
        if let Some(session) = &self.session {
            session.borrow_mut().refresh_obstacles();
        }
    }

    #[wasm_bindgen(getter, js_name = isRunning)]
    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.borrow().is_running())
            .unwrap_or(false)
    }

    pub fn destroy(&mut self) {
        if let Some(session) = self.session.take() {
            session.borrow_mut().dispose();
        }
    }
}

impl MetaBalls {
    fn downgrade(&self) -> Option<Weak<RefCell<Session>>> {
        self.session.as_ref().map(Rc::downgrade)
    }
}

impl Drop for MetaBalls {
    fn drop(&mut self) {
        self.destroy();
    }
}

type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut()>>>>;

/// Fades a [`MetaBalls`] out as the first screen scrolls away.
///
/// Scroll events are coalesced to one opacity update per animation frame.
#[wasm_bindgen]
pub struct ScrollFade {
    window: Window,
    on_scroll: Option<Closure<dyn FnMut()>>,
    on_resize: Option<Closure<dyn FnMut()>>,
    update: FrameCallback,
    pending: Rc<Cell<Option<i32>>>,
}

#[wasm_bindgen]
impl ScrollFade {
    #[wasm_bindgen(constructor)]
    pub fn new(target: &MetaBalls) -> Result<ScrollFade, JsValue> {
        let window = web_sys::window().ok_or("no window")?;
        let session = target.downgrade();

        let apply: Rc<dyn Fn()> = {
            let window = window.clone();
            Rc::new(move || {
                let Some(session) = session.as_ref().and_then(Weak::upgrade) else {
                    return;
                };
                let scroll_y = window.scroll_y().unwrap_or(0.0);
                let inner_height = render::inner_size(&window).map(|(_, h)| h).unwrap_or(0.0);
                let opacity = geometry::scroll_fade(scroll_y, inner_height);
                if let Ok(mut s) = session.try_borrow_mut() {
                    s.set_opacity(opacity);
                }
            })
        };

        let pending: Rc<Cell<Option<i32>>> = Rc::new(Cell::new(None));
        let update: FrameCallback = Rc::new(RefCell::new(None));
        {
            let pending = pending.clone();
            let apply = apply.clone();
            *update.borrow_mut() = Some(Closure::wrap(Box::new(move || {
                pending.set(None);
                apply();
            }) as Box<dyn FnMut()>));
        }

        let on_scroll = {
            let window = window.clone();
            let pending = pending.clone();
            let update = update.clone();
            Closure::wrap(Box::new(move || {
                if pending.get().is_some() {
                    return;
                }
                if let Some(f) = update.borrow().as_ref() {
                    match window.request_animation_frame(f.as_ref().unchecked_ref()) {
                        Ok(id) => pending.set(Some(id)),
                        Err(e) => warn!("requestAnimationFrame failed: {:?}", e),
                    }
                }
            }) as Box<dyn FnMut()>)
        };
        let on_resize = {
            let apply = apply.clone();
            Closure::wrap(Box::new(move || apply()) as Box<dyn FnMut()>)
        };

        let opts = web_sys::AddEventListenerOptions::new();
        opts.set_passive(true);
        window.add_event_listener_with_callback_and_add_event_listener_options(
            "scroll",
            on_scroll.as_ref().unchecked_ref(),
            &opts,
        )?;
        let mut fade = ScrollFade {
            window: window.clone(),
            on_scroll: Some(on_scroll),
            on_resize: None,
            update,
            pending,
        };
        window.add_event_listener_with_callback("resize", on_resize.as_ref().unchecked_ref())?;
        fade.on_resize = Some(on_resize);

        apply();
        Ok(fade)
    }

    /// Detach listeners and drop any queued update.
    pub fn destroy(&mut self) {
        if let Some(f) = self.on_scroll.take() {
            let _ = self
                .window
                .remove_event_listener_with_callback("scroll", f.as_ref().unchecked_ref());
        }
        if let Some(f) = self.on_resize.take() {
            let _ = self
                .window
                .remove_event_listener_with_callback("resize", f.as_ref().unchecked_ref());
        }
        if let Some(id) = self.pending.take() {
            let _ = self.window.cancel_animation_frame(id);
        }
        self.update.borrow_mut().take();
    }
}

impl Drop for ScrollFade {
    fn drop(&mut self) {
        self.destroy();
    }
}
